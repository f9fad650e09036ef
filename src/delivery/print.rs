use crate::error::DeliveryError;
use crate::frame::ImageData;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Host rendering target that accepts one image and hands it to the printer
pub trait PrintSurface: Send + Sync {
    fn print(&self, image: &ImageData) -> Result<(), DeliveryError>;
}

/// Writes each job into a spool directory and optionally runs a print
/// command (such as `lp`) with the spooled file as its last argument.
/// With a command, the file is removed once the command accepts it; jobs
/// the command rejects stay behind for a manual reprint. Without one, the
/// spool directory is the output and files are kept.
pub struct SpoolPrintSurface {
    spool_dir: PathBuf,
    command: Option<String>,
}

impl SpoolPrintSurface {
    pub fn new<P: Into<PathBuf>>(spool_dir: P, command: Option<String>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            command: command.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    fn spool(&self, image: &ImageData) -> Result<PathBuf, DeliveryError> {
        let bytes = image
            .decode()
            .map_err(|details| DeliveryError::PrintFailed { details })?;

        fs::create_dir_all(&self.spool_dir).map_err(|e| DeliveryError::PrintFailed {
            details: format!("Failed to create spool directory: {}", e),
        })?;

        let path = self
            .spool_dir
            .join(format!("{}.{}", Uuid::new_v4(), image.extension()));
        fs::write(&path, bytes).map_err(|e| DeliveryError::PrintFailed {
            details: format!("Failed to write print job: {}", e),
        })?;

        debug!("Spooled print job to {}", path.display());
        Ok(path)
    }

    fn run_command(&self, command: &str, path: &Path) -> Result<(), DeliveryError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| DeliveryError::PrintFailed {
            details: "Print command is empty".to_string(),
        })?;

        let status = Command::new(program)
            .args(parts)
            .arg(path)
            .status()
            .map_err(|e| DeliveryError::PrintFailed {
                details: format!("Failed to run '{}': {}", program, e),
            })?;

        if !status.success() {
            warn!("Print command '{}' exited with {}", command, status);
            return Err(DeliveryError::PrintFailed {
                details: format!("'{}' exited with {}", program, status),
            });
        }

        Ok(())
    }
}

impl PrintSurface for SpoolPrintSurface {
    fn print(&self, image: &ImageData) -> Result<(), DeliveryError> {
        let path = self.spool(image)?;

        if let Some(command) = &self.command {
            if let Err(e) = self.run_command(command, &path) {
                warn!("Keeping failed print job {}", path.display());
                return Err(e);
            }
            info!("Print job {} submitted", path.display());
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove spooled job {}: {}", path.display(), e);
            }
        } else {
            info!("Print job spooled to {} (no print command)", path.display());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn png() -> ImageData {
        ImageData::from_bytes("image/png", &[0x89, b'P', b'N', b'G'])
    }

    #[test]
    fn test_spool_writes_decoded_image() {
        let dir = TempDir::new().unwrap();
        let surface = SpoolPrintSurface::new(dir.path().join("spool"), None);

        surface.print(&png()).unwrap();

        let entries: Vec<_> = fs::read_dir(surface.spool_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].extension().unwrap(), "png");
        assert_eq!(fs::read(&entries[0]).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_blank_command_means_spool_only() {
        let dir = TempDir::new().unwrap();
        let surface = SpoolPrintSurface::new(dir.path(), Some("   ".to_string()));
        assert!(surface.print(&png()).is_ok());
    }

    #[test]
    fn test_undecodable_image_fails() {
        let dir = TempDir::new().unwrap();
        let surface = SpoolPrintSurface::new(dir.path(), None);
        let image = ImageData::from_data_url("data:image/png;base64,***").unwrap();

        assert!(matches!(
            surface.print(&image),
            Err(DeliveryError::PrintFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_print_command_runs_with_spooled_path() {
        let dir = TempDir::new().unwrap();
        let surface = SpoolPrintSurface::new(dir.path(), Some("true".to_string()));
        assert!(surface.print(&png()).is_ok());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let surface = SpoolPrintSurface::new(dir.path(), Some("false".to_string()));
        assert!(matches!(
            surface.print(&png()),
            Err(DeliveryError::PrintFailed { .. })
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_print_program() {
        let dir = TempDir::new().unwrap();
        let surface = SpoolPrintSurface::new(
            dir.path(),
            Some("definitely-not-a-print-command-7f3a".to_string()),
        );
        match surface.print(&png()) {
            Err(DeliveryError::PrintFailed { details }) => {
                assert!(details.contains("Failed to run"));
            }
            other => panic!("Expected PrintFailed, got {:?}", other),
        }
    }
}
