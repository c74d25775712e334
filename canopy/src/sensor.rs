//! Sensor seam.

/// Source of the scalar readings a reporter sends.
pub trait ReadingSource {
    /// Takes one reading.
    fn read(&mut self) -> u32;
}

/// Simulated temperature sensor.
///
/// Picks uniformly from a small set of plausible values, which makes the
/// collector's averages move around in simulation without real hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedTemperature;

const TEMPS: [u32; 5] = [30, 25, 20, 15, 10];

impl ReadingSource for SimulatedTemperature {
    fn read(&mut self) -> u32 {
        TEMPS[rand::random::<u32>() as usize % TEMPS.len()]
    }
}

/// Sensor that always returns the same value. Useful for soak setups and
/// tests where the payload must be predictable.
#[derive(Debug, Clone, Copy)]
pub struct FixedReading(pub u32);

impl ReadingSource for FixedReading {
    fn read(&mut self) -> u32 {
        self.0
    }
}
