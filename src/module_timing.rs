use embassy_time::Duration;

/// Low time of `PWR_ON` pin to trigger module switch on from power off mode
pub fn pwr_on_time() -> Duration {
    Duration::from_millis(100)
}

/// How long to wait before the module is ready after boot
pub fn boot_wait() -> Duration {
    Duration::from_secs(5)
}

/// Upper bound for the module to answer `AT` after power on
pub fn bring_up_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Upper bound for network registration; NB-IoT attach can take minutes
pub fn registration_timeout() -> Duration {
    Duration::from_secs(180)
}
