//! chunkcached's library half: the connection server (component E) and
//! request dispatch. Split out from `main.rs` so the integration test
//! crate can drive a real listener in-process instead of shelling out to
//! the compiled binary, the same way the teacher keeps `summitd`'s task
//! bodies in library modules and leaves `main.rs` to just wire them up.

pub mod dispatch;
pub mod server;
pub mod status;
