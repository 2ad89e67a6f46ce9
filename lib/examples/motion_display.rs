// SPDX-License-Identifier: Apache-2.0 OR MIT

// Drives a console-backed display from a motion sensor on /dev/gpiochip0
// line 18, switching off after ten seconds without motion.

use gpiomon::{Display, MotionSensor, SensorConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

struct ConsoleDisplay {
    off: AtomicBool,
}

impl Display for ConsoleDisplay {
    fn is_off(&self) -> bool {
        self.off.load(Ordering::SeqCst)
    }

    fn on(&self) {
        self.off.store(false, Ordering::SeqCst);
        println!("display on");
    }

    fn off(&self) {
        self.off.store(true, Ordering::SeqCst);
        println!("display off");
    }
}

fn main() -> gpiomon::Result<()> {
    let display = ConsoleDisplay {
        off: AtomicBool::new(true),
    };
    let config = SensorConfig {
        delay: Duration::from_secs(10),
        ..Default::default()
    };
    let mut sensor = MotionSensor::new(display, config);
    sensor.enable()?;
    println!("sensing motion on line 18, ctrl-C to exit...");
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
