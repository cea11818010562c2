pub mod common;
pub mod invites;
pub mod migrations;
pub mod organizations;
pub mod payments;
pub mod users;
