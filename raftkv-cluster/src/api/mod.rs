//! HTTP client surface.
//!
//! | Endpoint | Method | Input |
//! |---|---|---|
//! | `/get` | GET | query `key` |
//! | `/set` | POST | JSON `{key, value}` |
//! | `/delete` | POST | JSON `{key}` |
//! | `/join` | POST | query `peerAddress` |
//! | `/status` | GET | - |

pub mod error;
mod handlers;
pub mod request;
pub mod response;
mod router;
mod server;

pub use error::ApiError;
pub use router::route;
pub use server::ApiServer;
