pub mod commands;
pub mod delivery;
pub mod reader;
pub mod response;
pub mod server;
pub mod session;
pub mod stream;

pub use commands::SmtpCommand;
pub use delivery::{Envelope, MessageHandler};
pub use reader::SessionReader;
pub use response::{ReplyCode, SmtpResponse};
pub use server::{listen, ServerHandle, ServerOptions, SmtpServer};
pub use session::SmtpSession;
pub use stream::SmtpStream;
