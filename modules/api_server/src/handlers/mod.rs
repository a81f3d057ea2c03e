pub mod models;
pub mod providers;
pub mod stream;
pub mod sync;
pub mod system;
