//! Epoch-millis helper shared by the REST layer, for wall-clock
//! reporting fields that do not need to be injectable (unlike
//! [`crate::lease::ClockFn`], which backs time-sensitive lease expiry
//! and must be fake-able in tests).

pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
