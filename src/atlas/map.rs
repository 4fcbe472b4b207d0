//! Capability traits shared by map implementations.
//!
//! [`Map`] is the minimal contract every map carries: access to its
//! identification record. [`MapPersistence`] adds whole-map serialization
//! and file save/load on top of it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;

use super::identification::Identification;

pub trait Map {
    /// Copy of the identification record.
    fn identification_snapshot(&self) -> Identification;

    /// Mutate the identification record in place.
    fn update_identification(&self, f: &mut dyn FnMut(&mut Identification));

    fn uuid_string(&self) -> String {
        self.identification_snapshot().uuid_string()
    }

    fn name(&self) -> String {
        self.identification_snapshot().name().to_string()
    }
}

pub trait MapPersistence: Map + Sized {
    /// Encode the whole map as one unit.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Decode a map, rejecting anything that is not a consistent map.
    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    /// Write to `path` atomically: the bytes go to a sibling temp file which
    /// is then renamed over the destination.
    fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let tmp = temp_path(path);
        fs::write(&tmp, &bytes)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        info!("Saved map {} ({} bytes) to {}", self.uuid_string(), bytes.len(), path.display());
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let map = Self::from_bytes(&bytes)?;
        info!("Loaded map {} from {}", map.uuid_string(), path.display());
        Ok(map)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/data/maps/lab.vsmp"));
        assert_eq!(tmp, PathBuf::from("/data/maps/lab.vsmp.tmp"));
    }
}
