//! Domain primitives and driving ports.
//!
//! Purpose: define the strongly typed entities, validation rules, error
//! kinds and service traits shared by every adapter. Keep this layer free
//! of persistence and transport concerns so the same types can be mapped by
//! any adapter (HTTP, WebSocket, background workers).

pub mod auth;
pub mod dial;
pub mod error;
pub mod event;
pub mod membership;
pub mod ports;
pub mod principal;
pub mod report;
pub mod user;

pub use self::auth::{Auth, AuthFilter, NewAuth, AUTH_SOURCE_GITHUB};
pub use self::dial::{Dial, DialFilter, DialUpdate, NewDial, MAX_DIAL_NAME_LEN};
pub use self::error::{Error, ErrorCode};
pub use self::event::{DialMembershipValueChangedPayload, DialValueChangedPayload, Event};
pub use self::membership::{
    DialMembership, DialMembershipFilter, DialMembershipSortBy, DialMembershipUpdate,
    NewDialMembership,
};
pub use self::principal::Principal;
pub use self::report::{DialValueRecord, DialValueReport};
pub use self::user::{NewUser, User, UserFilter, UserUpdate};

/// Convenient result alias for domain operations.
pub type Result<T> = std::result::Result<T, Error>;
