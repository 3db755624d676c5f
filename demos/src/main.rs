//! End-to-end demo: a simulated control loop logging an IMU vector and a
//! joint-angle matrix at a fixed rate through an [`Appender`]-managed
//! [`Logger`], then flushing the rest on shutdown.

use anyhow::Context;
use matlog_backend::Hdf5Backend;
use matlog_core::{Appender, Logger, LoggerConfig};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = LoggerConfig::new("control_loop.mat")
        .with_default_buffer_size(2000)
        .with_wake_threshold_bytes(2_000_000);
    let logger = Logger::new(config, Box::new(Hdf5Backend::new())).context("open logger")?;

    let appender = Appender::new();
    let _ = appender.add_logger(&logger);
    appender.start_flush_thread(Duration::from_millis(100));

    let imu = logger.create("imu", 6, 1).context("create imu variable")?;
    let joint_angles = logger.create("joint_angles", 7, 1).context("create joint_angles variable")?;

    for step in 0..10_000u64 {
        let t = step as f64 * 0.001;
        let sample: [f64; 6] = [t.sin(), t.cos(), 0.0, 0.0, 0.0, 9.81];
        if !imu.append(&sample)? {
            tracing::warn!(step, "imu buffer under back-pressure, sample dropped");
        }

        let angles: [f64; 7] = std::array::from_fn(|i| (t + i as f64).sin());
        if !joint_angles.append(&angles)? {
            tracing::warn!(step, "joint_angles buffer under back-pressure, sample dropped");
        }

        std::thread::sleep(Duration::from_micros(100));
    }

    drop(appender);
    drop(logger); // drains remaining buffered samples and closes the file
    Ok(())
}
