/// Persisted entity definitions for the room subtree.
pub mod models;
/// Room state storage and change-feed operations.
pub mod room_store;
/// Storage abstraction layer shared by backends.
pub mod storage;
