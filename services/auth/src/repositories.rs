//! Repositories for database operations

pub mod backup_code;
pub mod failed_login;
pub mod session;
pub mod user;
pub mod verification;

pub use backup_code::BackupCodeRepository;
pub use failed_login::FailedLoginRepository;
pub use session::SessionRepository;
pub use user::{EmailChange, UserRepository};
pub use verification::VerificationRepository;
