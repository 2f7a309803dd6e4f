//! The one lock type the workspace uses for short, synchronous critical sections:
//! connection set membership, listener and dialer slots, session role state.
//! A guard is never held across an `.await`.

pub type Mutex<T> = parking_lot::Mutex<T>;
pub type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;
