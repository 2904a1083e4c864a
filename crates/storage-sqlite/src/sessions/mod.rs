mod model;
mod repository;

pub use model::SessionDB;
pub use repository::{IssuedSession, SessionRepository};
