//! Authentication service models

pub mod session;
pub mod user;
pub mod verification;

// Re-export for convenience
pub use session::{NewSession, Session, SessionView};
pub use user::{BackupCode, NewUser, User, UserView};
pub use verification::{AttemptCount, CodePurpose, VerificationCode};
