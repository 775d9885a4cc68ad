//! Real-time channel: wire protocol, rooms, authentication and the socket gateway.

pub mod auth;
pub mod gateway;
pub mod protocol;
pub mod rooms;

pub use auth::{AuthError, AuthenticatedUser, Authenticator};
pub use gateway::{ws_handler, Gateway};
pub use protocol::{ClientEvent, ServerEvent};
pub use rooms::{Broadcaster, NoopBroadcaster, RoomHub};
