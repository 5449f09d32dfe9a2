//! Environmental sensor adapters.
//!
//! The hardware driver lives outside this crate. [`FileSensor`] reads the
//! latest `temperature,humidity` line an external driver keeps up to date.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

/// One sensor sample. A `None` field is reported as unavailable.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorReading {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
}

impl SensorReading {
    pub fn unavailable() -> Self {
        Self::default()
    }
}

pub trait Sensor {
    fn read(&mut self) -> Result<SensorReading>;
}

/// No sensor attached; every field is unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSensor;

impl Sensor for NoSensor {
    fn read(&mut self) -> Result<SensorReading> {
        Ok(SensorReading::unavailable())
    }
}

/// Reads `temperature,humidity` from a text file. Either field may be empty.
#[derive(Clone, Debug)]
pub struct FileSensor {
    path: PathBuf,
}

impl FileSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Sensor for FileSensor {
    fn read(&mut self) -> Result<SensorReading> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read sensor file {}", self.path.display()))?;
        let line = raw
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| anyhow!("sensor file {} is empty", self.path.display()))?;
        parse_reading(line)
    }
}

fn parse_reading(line: &str) -> Result<SensorReading> {
    let mut fields = line.split(',');
    let temperature = parse_field(fields.next(), "temperature")?;
    let humidity = parse_field(fields.next(), "humidity")?;
    if fields.next().is_some() {
        return Err(anyhow!("unexpected extra sensor fields in {:?}", line));
    }
    Ok(SensorReading {
        temperature,
        humidity,
    })
}

fn parse_field(field: Option<&str>, name: &str) -> Result<Option<f32>> {
    match field.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("unavailable") => Ok(None),
        Some(value) => {
            let parsed: f32 = value
                .parse()
                .with_context(|| format!("invalid {} value {:?}", name, value))?;
            if !parsed.is_finite() {
                return Err(anyhow!("non-finite {} value {:?}", name, value));
            }
            Ok(Some(parsed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_and_partial_readings() -> Result<()> {
        assert_eq!(
            parse_reading("21.5, 48")?,
            SensorReading {
                temperature: Some(21.5),
                humidity: Some(48.0)
            }
        );
        assert_eq!(
            parse_reading("21.5,")?,
            SensorReading {
                temperature: Some(21.5),
                humidity: None
            }
        );
        assert_eq!(parse_reading("unavailable,unavailable")?, SensorReading::unavailable());
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_reading("warm,wet").is_err());
        assert!(parse_reading("1,2,3").is_err());
        assert!(parse_reading("NaN,2").is_err());
    }

    #[test]
    fn file_sensor_reads_last_line() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "19.0,50.0")?;
        writeln!(file, "20.25,55.5")?;
        writeln!(file)?;
        let mut sensor = FileSensor::new(file.path());
        assert_eq!(
            sensor.read()?,
            SensorReading {
                temperature: Some(20.25),
                humidity: Some(55.5)
            }
        );
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut sensor = FileSensor::new("/nonexistent/sensor.txt");
        assert!(sensor.read().is_err());
    }

    #[test]
    fn no_sensor_is_always_unavailable() -> Result<()> {
        assert_eq!(NoSensor.read()?, SensorReading::unavailable());
        Ok(())
    }
}
