use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{ShipError, ShipResult};

/// Compute the SHA256 digest of the file at `path` and return it as a hex string.
pub fn compute_sha256(path: &Path) -> ShipResult<String> {
    let file = File::open(path)
        .map_err(|err| ShipError::io("Failed to open file for hashing", path, err))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|err| ShipError::io("Failed to read file for hashing", path, err))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Write `<artifact>.sha256` next to `artifact` in `sha256sum` format.
pub fn write_checksum_file(artifact: &Path) -> ShipResult<(String, PathBuf)> {
    let digest = compute_sha256(artifact)?;
    let mut output = artifact.as_os_str().to_owned();
    output.push(".sha256");
    let output = PathBuf::from(output);

    let file_name = artifact
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut file = File::create(&output)
        .map_err(|err| ShipError::io("Failed to create digest file", &output, err))?;
    writeln!(file, "{digest}  {file_name}")
        .map_err(|err| ShipError::io("Failed to write digest file", &output, err))?;
    Ok((digest, output))
}
