//! Built-in flight pattern library
//!
//! The X80 has no GPS, so every pattern is a plain time sequence of stick
//! inputs. Durations are tuned for the stock airframe at medium speed;
//! they are declarative data, nothing here touches the clock.

/// One timed stick setting inside a pattern
#[derive(Debug, Clone, Copy)]
pub struct FlightStep {
    pub roll: f32,
    pub pitch: f32,
    pub throttle: f32,
    pub yaw: f32,
    pub duration_ms: u64,
}

impl FlightStep {
    const fn hold(duration_ms: u64) -> Self {
        Self {
            roll: 0.0,
            pitch: 0.0,
            throttle: 0.0,
            yaw: 0.0,
            duration_ms,
        }
    }
}

/// A named, ordered sequence of steps
#[derive(Debug, Clone)]
pub struct FlightPattern {
    pub name: &'static str,
    pub steps: Vec<FlightStep>,
}

impl FlightPattern {
    /// Sum of all step durations
    pub fn total_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms).sum()
    }
}

fn step(roll: f32, pitch: f32, throttle: f32, yaw: f32, duration_ms: u64) -> FlightStep {
    FlightStep {
        roll,
        pitch,
        throttle,
        yaw,
        duration_ms,
    }
}

/// Forward pitch with constant yaw closes a circle in one full turn
pub fn circle() -> FlightPattern {
    FlightPattern {
        name: "circle",
        steps: vec![step(0.0, 50.0, 0.0, 50.0, 12_566)],
    }
}

/// Four straight sides with 90-degree yaw turns between them
pub fn square() -> FlightPattern {
    let mut steps = Vec::with_capacity(8);
    for _ in 0..4 {
        steps.push(step(0.0, 50.0, 0.0, 0.0, 2_000));
        steps.push(step(0.0, 0.0, 0.0, 75.0, 750));
    }
    FlightPattern {
        name: "square",
        steps,
    }
}

/// Two opposing loops
pub fn figure_eight() -> FlightPattern {
    FlightPattern {
        name: "figure-eight",
        steps: vec![
            step(0.0, 50.0, 0.0, 50.0, 3_000),
            step(0.0, 50.0, 0.0, -50.0, 3_000),
        ],
    }
}

/// Forward legs with alternating roll
pub fn zigzag() -> FlightPattern {
    let steps = (0..4)
        .map(|i| {
            let roll = if i % 2 == 0 { 50.0 } else { -50.0 };
            step(roll, 50.0, 0.0, 0.0, 1_500)
        })
        .collect();
    FlightPattern {
        name: "zigzag",
        steps,
    }
}

/// Panoramic spin in place
pub fn hover_and_rotate() -> FlightPattern {
    FlightPattern {
        name: "hover-and-rotate",
        steps: vec![step(0.0, 0.0, 0.0, 40.0, 8_000)],
    }
}

/// Climb, hold, descend
pub fn ascend_descend() -> FlightPattern {
    FlightPattern {
        name: "ascend-descend",
        steps: vec![
            step(0.0, 0.0, 50.0, 0.0, 3_000),
            FlightStep::hold(2_000),
            step(0.0, 0.0, -50.0, 0.0, 3_000),
        ],
    }
}

/// Sideways roll plus gentle yaw orbits a central point
pub fn orbit() -> FlightPattern {
    FlightPattern {
        name: "orbit",
        steps: vec![step(40.0, 0.0, 0.0, 20.0, 10_000)],
    }
}

/// Circular climb
pub fn helix() -> FlightPattern {
    FlightPattern {
        name: "helix",
        steps: vec![step(0.0, 40.0, 40.0, 50.0, 6_000)],
    }
}

/// Alternating side swings
pub fn pendulum() -> FlightPattern {
    let steps = (0..4)
        .map(|i| {
            let roll = if i % 2 == 0 { 50.0 } else { -50.0 };
            step(roll, 0.0, 0.0, 0.0, 1_500)
        })
        .collect();
    FlightPattern {
        name: "pendulum",
        steps,
    }
}

/// Expanding spiral (coarse single-step approximation)
pub fn spiral_out() -> FlightPattern {
    FlightPattern {
        name: "spiral-out",
        steps: vec![step(20.0, 40.0, 0.0, 50.0, 8_000)],
    }
}

/// All built-in pattern names, in menu order
pub fn names() -> [&'static str; 10] {
    [
        "circle",
        "square",
        "figure-eight",
        "zigzag",
        "hover-and-rotate",
        "ascend-descend",
        "orbit",
        "helix",
        "pendulum",
        "spiral-out",
    ]
}

/// Look up a built-in pattern, case-insensitive
pub fn by_name(name: &str) -> Option<FlightPattern> {
    match name.to_ascii_lowercase().as_str() {
        "circle" => Some(circle()),
        "square" => Some(square()),
        "figure-eight" => Some(figure_eight()),
        "zigzag" => Some(zigzag()),
        "hover-and-rotate" => Some(hover_and_rotate()),
        "ascend-descend" => Some(ascend_descend()),
        "orbit" => Some(orbit()),
        "helix" => Some(helix()),
        "pendulum" => Some(pendulum()),
        "spiral-out" => Some(spiral_out()),
        _ => None,
    }
}
