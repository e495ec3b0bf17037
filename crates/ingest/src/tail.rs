use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Read position inside one log file. The inode pins the cursor to a
/// specific file so rotation is detected even when the path is reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCursor {
    pub inode: Option<u64>,
    pub offset: u64,
}

/// Lines appended since the cursor, plus where the next pull should resume.
#[derive(Debug)]
pub(crate) struct TailRead {
    pub lines: Vec<String>,
    pub cursor: FileCursor,
    pub error: Option<io::Error>,
}

/// Read newline-terminated lines past `cursor`. Rotation (inode change) and
/// truncation (length shrink) reset the cursor to the start of the file. A
/// trailing line without a newline is left unconsumed for the next pull.
pub(crate) fn read_new_lines(path: &Path, cursor: FileCursor) -> io::Result<TailRead> {
    let metadata = fs::metadata(path)?;
    let inode = inode_from_metadata(&metadata);
    let len = metadata.len();
    let mut offset = cursor.offset;
    if inode != cursor.inode || len < offset {
        offset = 0;
    }

    let mut lines = Vec::new();
    if offset >= len {
        return Ok(TailRead {
            lines,
            cursor: FileCursor { inode, offset },
            error: None,
        });
    }

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);
    let mut buf = String::new();
    let mut error = None;
    loop {
        buf.clear();
        match reader.read_line(&mut buf) {
            Ok(0) => break,
            Ok(bytes) => {
                if !buf.ends_with('\n') {
                    break;
                }
                offset = offset.saturating_add(bytes as u64);
                let line = buf.trim_end_matches(&['\n', '\r'][..]);
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
            }
            Err(err) => {
                error = Some(err);
                break;
            }
        }
    }

    Ok(TailRead {
        lines,
        cursor: FileCursor { inode, offset },
        error,
    })
}

pub(crate) fn inode_from_metadata(metadata: &fs::Metadata) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(metadata.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resumes_from_stored_offset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("usage.jsonl");
        fs::write(&path, "one\ntwo\n").expect("write");

        let first = read_new_lines(&path, FileCursor::default()).expect("first read");
        assert_eq!(first.lines, vec!["one".to_string(), "two".to_string()]);

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open");
        writeln!(file, "three").expect("append");

        let second = read_new_lines(&path, first.cursor).expect("second read");
        assert_eq!(second.lines, vec!["three".to_string()]);
    }

    #[test]
    fn truncation_resets_to_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("usage.jsonl");
        fs::write(&path, "one\ntwo\n").expect("write");
        let first = read_new_lines(&path, FileCursor::default()).expect("first read");

        fs::write(&path, "fresh\n").expect("truncate");
        let second = read_new_lines(&path, first.cursor).expect("second read");
        assert_eq!(second.lines, vec!["fresh".to_string()]);
    }

    #[test]
    fn partial_trailing_line_is_held_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("usage.jsonl");
        fs::write(&path, "complete\npart").expect("write");

        let first = read_new_lines(&path, FileCursor::default()).expect("first read");
        assert_eq!(first.lines, vec!["complete".to_string()]);
        assert_eq!(first.cursor.offset, "complete\n".len() as u64);

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open");
        writeln!(file, "ial").expect("finish line");

        let second = read_new_lines(&path, first.cursor).expect("second read");
        assert_eq!(second.lines, vec!["partial".to_string()]);
    }

    #[test]
    fn rotation_is_detected_by_inode_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("usage.jsonl");
        fs::write(&path, "old\n").expect("write");
        let first = read_new_lines(&path, FileCursor::default()).expect("first read");

        let rotated = dir.path().join("usage.jsonl.1");
        fs::rename(&path, &rotated).expect("rotate");
        fs::write(&path, "new\n").expect("recreate");

        let second = read_new_lines(&path, first.cursor).expect("second read");
        assert_eq!(second.lines, vec!["new".to_string()]);
    }
}
