/*!
# DM calibration

The calibration files of a deformable mirror are stored in a per-device directory below the
root directory given by the `ALPAO_CALIB` environment variable:
```text
$ALPAO_CALIB/alpao_<serial>/<serial>_userconfig.txt
$ALPAO_CALIB/alpao_<serial>/<serial>_actuator_mapping.fits
```
where `<serial>` is the lower case serial number of the mirror.

The user configuration is a plain text file, the first token of its first line is the
maximum stroke of the actuators in microns and the first token of its second line is the
volume normalization factor:
```text
3.17 max stroke [micron]
0.454 volume factor
```
*/

use std::{
    env,
    fmt::Display,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::fits::FitsError;

/// Environment variable with the path to the calibration root directory
pub const CALIB_ROOT_ENV: &str = "ALPAO_CALIB";

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("environment variable {0} is not set")]
    MissingRoot(String),
    #[error("failed to open {path:?}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("expected 2 numeric lines in {path:?}, found {found}")]
    MissingConstants { path: PathBuf, found: usize },
    #[error("{name} must be strictly positive, found {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("failed to decode the actuator mapping {path:?}")]
    Fits { path: PathBuf, source: FitsError },
    #[error("the actuator mapping must be a 2D image, found {0} axes")]
    NotTwoD(usize),
    #[error("the actuator mapping has {found} active actuators but the DM has {expected}")]
    ActuatorCount { expected: usize, found: usize },
}
type Result<T> = std::result::Result<T, ConfigurationError>;

/// Calibration root directory
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRoot(PathBuf);
impl CalibrationRoot {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self(path.into())
    }
    /// Gets the calibration root directory from the `ALPAO_CALIB` environment variable
    pub fn from_env() -> Result<Self> {
        Self::from_var(CALIB_ROOT_ENV)
    }
    pub(crate) fn from_var(var: &str) -> Result<Self> {
        env::var_os(var)
            .map(|path| Self(path.into()))
            .ok_or_else(|| ConfigurationError::MissingRoot(var.into()))
    }
    /// Returns the calibration directory of the DM with serial number `serial`
    pub fn device_dir(&self, serial: &str) -> PathBuf {
        self.0.join(format!("alpao_{}", serial.to_lowercase()))
    }
    /// Returns the path to the user configuration file
    pub fn userconfig(&self, serial: &str) -> PathBuf {
        self.device_dir(serial)
            .join(format!("{}_userconfig.txt", serial.to_lowercase()))
    }
    /// Returns the path to the actuator mapping file
    pub fn actuator_mapping(&self, serial: &str) -> PathBuf {
        self.device_dir(serial)
            .join(format!("{}_actuator_mapping.fits", serial.to_lowercase()))
    }
}
impl AsRef<Path> for CalibrationRoot {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Physical to fractional stroke conversion constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    max_stroke: f64,
    volume_factor: f64,
}
impl Calibration {
    /// Creates a new calibration
    ///
    /// Both the maximum stroke (in microns) and the volume factor must be strictly positive
    pub fn new(max_stroke: f64, volume_factor: f64) -> Result<Self> {
        for (name, value) in [("max stroke", max_stroke), ("volume factor", volume_factor)] {
            if !(value.is_finite() && value > 0.) {
                return Err(ConfigurationError::NonPositive { name, value });
            }
        }
        Ok(Self {
            max_stroke,
            volume_factor,
        })
    }
    /// Loads the calibration of the DM with serial number `serial`
    pub fn load(root: &CalibrationRoot, serial: &str) -> Result<Self> {
        let path = root.userconfig(serial);
        log::info!("loading {serial} calibration from {path:?}");
        let file = File::open(&path).map_err(|source| ConfigurationError::Open {
            path: path.clone(),
            source,
        })?;
        Self::from_reader(BufReader::new(file), path)
    }
    /// Reads the calibration constants from the first 2 numeric lines
    ///
    /// A line is numeric if its first token parses as a number,
    /// other lines are skipped
    pub fn from_reader<R: BufRead>(reader: R, path: PathBuf) -> Result<Self> {
        let mut constants = Vec::with_capacity(2);
        for line in reader.lines() {
            let line = line.map_err(|source| ConfigurationError::Read {
                path: path.clone(),
                source,
            })?;
            if let Some(value) = line
                .split_whitespace()
                .next()
                .and_then(|token| token.parse::<f64>().ok())
            {
                constants.push(value);
                if constants.len() == 2 {
                    break;
                }
            }
        }
        match constants[..] {
            [max_stroke, volume_factor] => Self::new(max_stroke, volume_factor),
            _ => Err(ConfigurationError::MissingConstants {
                path,
                found: constants.len(),
            }),
        }
    }
    /// Maximum actuator stroke in microns
    pub fn max_stroke(&self) -> f64 {
        self.max_stroke
    }
    /// Volume normalization factor
    pub fn volume_factor(&self) -> f64 {
        self.volume_factor
    }
}
impl Display for Calibration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "max stroke: {}micron, volume factor: {}",
            self.max_stroke, self.volume_factor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Calibration> {
        Calibration::from_reader(text.as_bytes(), PathBuf::from("userconfig.txt"))
    }

    #[test]
    fn device_paths() {
        let root = CalibrationRoot::new("/opt/calib");
        assert_eq!(
            root.userconfig("BAX150"),
            PathBuf::from("/opt/calib/alpao_bax150/bax150_userconfig.txt")
        );
        assert_eq!(
            root.actuator_mapping("BAX150"),
            PathBuf::from("/opt/calib/alpao_bax150/bax150_actuator_mapping.fits")
        );
    }

    #[test]
    fn userconfig() {
        let calib = parse("3.17 max stroke [micron]\n0.454 volume factor\n").unwrap();
        assert_eq!(calib.max_stroke(), 3.17);
        assert_eq!(calib.volume_factor(), 0.454);
    }

    #[test]
    fn header_lines_are_skipped() {
        let calib = parse("# BAX150\n\n3.17\n0.454\n99\n").unwrap();
        assert_eq!(calib, Calibration::new(3.17, 0.454).unwrap());
    }

    #[test]
    fn single_line() {
        assert!(matches!(
            parse("3.17\n"),
            Err(ConfigurationError::MissingConstants { found: 1, .. })
        ));
    }

    #[test]
    fn negative_constant() {
        assert!(matches!(
            parse("3.17\n-0.454\n"),
            Err(ConfigurationError::NonPositive {
                name: "volume factor",
                ..
            })
        ));
        assert!(Calibration::new(0., 1.).is_err());
        assert!(Calibration::new(f64::NAN, 1.).is_err());
    }

    #[test]
    fn unset_root() {
        assert!(matches!(
            CalibrationRoot::from_var("ALPAO_CALIB_UNSET_IN_TESTS"),
            Err(ConfigurationError::MissingRoot(_))
        ));
    }

    #[test]
    fn missing_file() {
        let root = CalibrationRoot::new(env::temp_dir().join("alpao-dm-no-such-root"));
        assert!(matches!(
            Calibration::load(&root, "BAX150"),
            Err(ConfigurationError::Open { .. })
        ));
    }
}
