pub mod auth;
pub mod block_requests;
pub mod cards;
pub mod transfers;
pub mod users;
