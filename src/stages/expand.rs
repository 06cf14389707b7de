use crate::constants::STAGE_EXPAND;
use crate::error::{EtlError, Result};
use crate::metrics::{time_stage, StageMetrics};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct ExpandReport {
    pub destination: PathBuf,
    /// Regular-file members written, relative to `destination`, sorted.
    pub members: Vec<PathBuf>,
}

/// Unpack a gzip-compressed tarball into `dest`.
///
/// `dest` is created when absent, and existing members are overwritten, so
/// expanding into an already-populated directory yields the same file set.
/// A failure part way through leaves the members written so far in place.
#[instrument(skip_all, fields(archive = %archive.display(), dest = %dest.display()))]
pub fn expand_archive(archive: &Path, dest: &Path) -> Result<ExpandReport> {
    let _timing = time_stage(STAGE_EXPAND);

    if !archive.is_file() {
        return Err(EtlError::extraction(STAGE_EXPAND, archive, "archive not found"));
    }
    let file = fs::File::open(archive)
        .map_err(|e| EtlError::extraction(STAGE_EXPAND, archive, format!("failed to open archive: {}", e)))?;

    fs::create_dir_all(dest).map_err(|e| {
        EtlError::extraction(STAGE_EXPAND, dest, format!("failed to create destination: {}", e))
    })?;

    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    tarball.set_overwrite(true);

    let entries = tarball
        .entries()
        .map_err(|e| EtlError::extraction(STAGE_EXPAND, archive, format!("not a valid tar.gz archive: {}", e)))?;

    let mut members = Vec::new();
    for entry in entries {
        let mut entry = entry
            .map_err(|e| EtlError::extraction(STAGE_EXPAND, archive, format!("not a valid tar.gz archive: {}", e)))?;
        let member = entry
            .path()
            .map_err(|e| EtlError::extraction(STAGE_EXPAND, archive, format!("invalid member path: {}", e)))?
            .into_owned();
        let is_file = entry.header().entry_type().is_file();

        // unpack_in refuses members that would land outside dest
        let unpacked = entry.unpack_in(dest).map_err(|e| {
            EtlError::extraction(
                STAGE_EXPAND,
                archive,
                format!("failed to unpack member {}: {}", member.display(), e),
            )
        })?;

        if unpacked && is_file {
            debug!("Unpacked {}", member.display());
            members.push(member);
        }
    }

    if members.is_empty() {
        return Err(EtlError::extraction(STAGE_EXPAND, archive, "archive contains no files"));
    }
    members.sort();

    StageMetrics::record_members_extracted(members.len());
    info!("📦 Expanded {} members into {}", members.len(), dest.display());

    Ok(ExpandReport {
        destination: dest.to_path_buf(),
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    fn write_tgz(path: &Path, files: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_expand_creates_destination() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tolldata.tgz");
        write_tgz(&archive, &[("vehicle-data.csv", &b"1,a\n"[..]), ("payment-data.txt", &b"x\n"[..])]);

        let dest = dir.path().join("staging/tolldata");
        let report = expand_archive(&archive, &dest).unwrap();

        assert_eq!(
            report.members,
            vec![PathBuf::from("payment-data.txt"), PathBuf::from("vehicle-data.csv")]
        );
        assert_eq!(fs::read(dest.join("vehicle-data.csv")).unwrap(), b"1,a\n");
    }

    #[test]
    fn test_expand_is_idempotent() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tolldata.tgz");
        write_tgz(&archive, &[("tollplaza-data.tsv", &b"1\t2\n"[..])]);
        let dest = dir.path().join("out");

        let first = expand_archive(&archive, &dest).unwrap();
        let second = expand_archive(&archive, &dest).unwrap();

        assert_eq!(first.members, second.members);
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 1);
        assert_eq!(fs::read(dest.join("tollplaza-data.tsv")).unwrap(), b"1\t2\n");
    }

    #[test]
    fn test_member_escaping_destination_is_skipped() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tolldata.tgz");
        let file = fs::File::create(&archive).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        // set_path refuses "..", so write the name bytes directly
        let payload = b"outside\n";
        let mut header = tar::Header::new_gnu();
        let name = b"../escape.txt";
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &payload[..]).unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "vehicle-data.csv", &b"1,a\n"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("staging/tolldata");
        let report = expand_archive(&archive, &dest).unwrap();

        assert_eq!(report.members, vec![PathBuf::from("vehicle-data.csv")]);
        assert!(!dir.path().join("staging/escape.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_missing_archive_is_extraction_error() {
        let dir = tempdir().unwrap();
        let err = expand_archive(&dir.path().join("nope.tgz"), &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, EtlError::Extraction { .. }));
    }

    #[test]
    fn test_invalid_archive_is_extraction_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("broken.tgz");
        fs::write(&archive, b"this is not gzip data at all").unwrap();

        let err = expand_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, EtlError::Extraction { .. }));
    }

    #[test]
    fn test_uncreatable_destination_is_extraction_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tolldata.tgz");
        write_tgz(&archive, &[("vehicle-data.csv", &b"1\n"[..])]);
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a dir").unwrap();

        let err = expand_archive(&archive, &blocker.join("sub")).unwrap_err();
        assert!(matches!(err, EtlError::Extraction { .. }));
    }
}
