mod poetry_lock;

pub use poetry_lock::{POETRY_LOCK_FILE, PoetryLock};
