pub mod engine;
pub use engine::{CommandEngine, EngineError, EngineRequest, TranslationEngine};

pub mod identity;
pub use identity::{AuthSession, CurrentUser, IdentityError, IdentityService};

pub mod session;
pub use session::{Claims, SessionError, SessionService};

pub mod translation;
pub use translation::{SettingsOverlay, TaskState, TaskStatus, TranslateError, TranslationService};
