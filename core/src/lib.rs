pub mod board;
pub mod gateway;
pub mod identity;
pub mod ornament;
pub mod panel;
pub mod placement;
pub mod sync;

pub use board::{
    Board, BoardServices, BoardSnapshot, BoardSubscription, DeleteOutcome, PollOutcome,
    SaveOutcome,
};
pub use gateway::{CreateReceipt, GatewayError, OrnamentGateway};
pub use identity::{get_or_create_user_id, IdentityStorage, UserId};
pub use ornament::{Fingerprint, Ornament, SaveOrnamentRequest, MAX_ORNAMENTS_PER_USER};
pub use placement::{Manipulation, PlacementError, SurfacePoint, SurfaceSize};
pub use sync::{dedupe_ornaments, PollTrigger, POLL_INTERVAL_MS};
