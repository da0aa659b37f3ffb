//! Durable sink for watch records.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Open (or create) the sink at `path`, truncated to offset zero.
pub fn open_sink(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    Ok(file)
}

/// Append every record to `sink`, flushing after each one.
///
/// Returns how many records were written. The first failing record, read or
/// write, stops the loop and is returned.
pub fn write_records<I, W>(records: I, sink: &mut W) -> Result<usize>
where
    I: IntoIterator<Item = Result<String>>,
    W: Write,
{
    let mut written = 0;
    for record in records {
        let record = record?;
        sink.write_all(record.as_bytes())?;
        sink.flush()?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpaError;
    use std::io;
    use tempfile::tempdir;

    /// Writer that records how many flushes it saw after each write.
    #[derive(Default)]
    struct FlushTracker {
        data: Vec<u8>,
        unflushed_writes: usize,
        flushes: usize,
    }

    impl Write for FlushTracker {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            self.unflushed_writes += 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.unflushed_writes = 0;
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn flushes_after_every_record() {
        let records = vec![Ok("a\n".to_string()), Ok("b\n".to_string())];
        let mut sink = FlushTracker::default();

        let written = write_records(records, &mut sink).unwrap();

        assert_eq!(written, 2);
        assert_eq!(sink.data, b"a\nb\n");
        assert_eq!(sink.flushes, 2);
        assert_eq!(sink.unflushed_writes, 0);
    }

    #[test]
    fn stops_at_first_error() {
        let records = vec![
            Ok("kept\n".to_string()),
            Err(OpaError::Worker("stream broke".to_string())),
            Ok("skipped\n".to_string()),
        ];
        let mut sink = FlushTracker::default();

        let err = write_records(records, &mut sink).unwrap_err();

        assert!(matches!(err, OpaError::Worker(_)));
        assert_eq!(sink.data, b"kept\n");
    }

    #[test]
    fn open_sink_creates_dirs_and_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("watch.txt");

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale content from an earlier watch\n").unwrap();

        let mut sink = open_sink(&path).unwrap();
        write_records(vec![Ok("fresh\n".to_string())], &mut sink).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn open_sink_missing_parent_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("watch.txt");

        open_sink(&path).unwrap();
        assert!(path.exists());
    }
}
