pub mod tls;

pub use tls::{self_signed_pem, TlsConfig};
