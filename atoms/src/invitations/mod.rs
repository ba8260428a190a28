pub mod code;
pub mod model;

pub use code::{display_code, generate_code, normalize_code, CODE_LENGTH, SAFE_ALPHABET};
pub use model::{Invitation, InvitationTarget, DEFAULT_MAX_USES};
