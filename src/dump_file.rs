use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::cluster_writer::write_atomic;
use crate::dump_snapshot::{
    DumpSnapshot, SymBox, HEADER_ATOMS, HEADER_NUM_OF_ATOMS, HEADER_SYM_BOX, HEADER_TIMESTEP,
};
use crate::error::{DumpParsingError, Error, ParseError, Result};

/// Streams snapshots out of a dump, one at a time and in file order.
///
/// The reader is single pass: after the last snapshot, or after the first
/// error, it yields nothing more.
pub struct DumpReader<R> {
    lines: Lines<R>,
    line_number: usize,
    last_step: Option<u64>,
    done: bool,
}

impl DumpReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            last_step: None,
            done: false,
        }
    }

    fn error(&self, kind: DumpParsingError) -> Error {
        Error::Parse(ParseError::new(self.line_number, kind))
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    /// Next line of a snapshot that has already started.
    fn expect_line(&mut self) -> Result<String> {
        self.next_line()?
            .ok_or_else(|| self.error(DumpParsingError::TruncatedSnapshot))
    }

    fn expect_header<'a>(
        &self,
        line: &'a str,
        header: &str,
        kind: DumpParsingError,
    ) -> Result<&'a str> {
        strip_header(line, header).ok_or_else(|| self.error(kind))
    }

    fn parse_value<T: std::str::FromStr>(&self, token: &str) -> Result<T> {
        token
            .parse::<T>()
            .map_err(|_| self.error(DumpParsingError::InvalidValue(token.to_string())))
    }

    fn read_sym_box(&mut self) -> Result<SymBox> {
        let line = self.expect_line()?;
        let flags = self.expect_header(&line, HEADER_SYM_BOX, DumpParsingError::MissingSymBox)?;
        let mut tokens = flags.split_whitespace().peekable();
        let triclinic = tokens.peek() == Some(&"xy");
        if triclinic {
            for tilt_key in ["xy", "xz", "yz"] {
                if tokens.next() != Some(tilt_key) {
                    return Err(self.error(DumpParsingError::InvalidSymBox));
                }
            }
        }
        let boundaries = tokens.collect::<Vec<_>>().join(" ");
        let values_per_line = if triclinic { 3 } else { 2 };
        let mut bounds = [[0.0; 2]; 3];
        let mut tilt = [0.0; 3];
        for dim in 0..3 {
            let line = self.expect_line()?;
            let values = line
                .split_whitespace()
                .map(|token| self.parse_value::<f64>(token))
                .collect::<Result<Vec<_>>>()?;
            if values.len() != values_per_line {
                return Err(self.error(DumpParsingError::InvalidSymBox));
            }
            bounds[dim] = [values[0], values[1]];
            if triclinic {
                tilt[dim] = values[2];
            }
        }
        let mut sym_box = SymBox::new(&boundaries, bounds);
        if triclinic {
            sym_box.tilt = Some(tilt);
        }
        Ok(sym_box)
    }

    fn read_keys(&mut self) -> Result<Vec<String>> {
        let line = self.expect_line()?;
        let keys_line =
            self.expect_header(&line, HEADER_ATOMS, DumpParsingError::MissingAtomKeys)?;
        let mut keys: Vec<String> = Vec::new();
        for key in keys_line.split_whitespace() {
            if keys.iter().any(|k| k == key) {
                return Err(self.error(DumpParsingError::DuplicateAtomKeys(key.to_string())));
            }
            keys.push(key.to_string());
        }
        if keys.is_empty() {
            return Err(self.error(DumpParsingError::MissingAtomKeys));
        }
        Ok(keys)
    }

    fn read_snapshot(&mut self) -> Result<Option<DumpSnapshot>> {
        let line = loop {
            match self.next_line()? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
                None => return Ok(None),
            }
        };
        self.expect_header(&line, HEADER_TIMESTEP, DumpParsingError::InvalidOrMissingTimestep)?;
        let line = self.expect_line()?;
        let step = line
            .trim()
            .parse::<u64>()
            .map_err(|_| self.error(DumpParsingError::InvalidOrMissingTimestep))?;
        if let Some(previous) = self.last_step.filter(|previous| step < *previous) {
            return Err(self.error(DumpParsingError::DecreasingTimestep { previous, step }));
        }

        let line = self.expect_line()?;
        self.expect_header(
            &line,
            HEADER_NUM_OF_ATOMS,
            DumpParsingError::InvalidOrMissingNumberOfAtoms,
        )?;
        let line = self.expect_line()?;
        let atoms_count = line
            .trim()
            .parse::<usize>()
            .map_err(|_| self.error(DumpParsingError::InvalidOrMissingNumberOfAtoms))?;

        let sym_box = self.read_sym_box()?;
        let keys = self.read_keys()?;
        let keys_count = keys.len();
        if atoms_count.checked_mul(keys_count).is_none() {
            return Err(self.error(DumpParsingError::InvalidOrMissingNumberOfAtoms));
        }
        // rows grow with the file, the header count only bounds the loop
        let mut rows = Vec::new();
        for _ in 0..atoms_count {
            let line = self.expect_line()?;
            let tokens = line.split_whitespace().collect::<Vec<_>>();
            if tokens.len() != keys_count {
                return Err(self.error(DumpParsingError::InvalidAtomRow {
                    expected: keys_count,
                    found: tokens.len(),
                }));
            }
            for token in tokens {
                rows.push(self.parse_value::<f64>(token)?);
            }
        }
        let snapshot = DumpSnapshot::from_rows(keys, step, sym_box, &rows);
        self.last_step = Some(step);
        debug!("parsed snapshot {step} ({atoms_count} atoms)");
        Ok(Some(snapshot))
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<DumpSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_snapshot() {
            Ok(Some(snapshot)) => Some(Ok(snapshot)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn strip_header<'a>(line: &'a str, header: &str) -> Option<&'a str> {
    line.trim_end()
        .strip_prefix(header)
        .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Reads a dump to the end and returns its final snapshot.
pub fn read_last_snapshot(path: &Path) -> Result<DumpSnapshot> {
    DumpReader::open(path)?.last().ok_or(Error::EmptyDump)?
}

/// A whole dump held in memory, ordered by timestep.
pub struct DumpFile {
    snapshots: Vec<DumpSnapshot>,
}

impl DumpFile {
    #[must_use]
    pub fn new(mut snapshots: Vec<DumpSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.step);
        Self { snapshots }
    }

    /// Reads the snapshots listed in `timesteps`, or all of them if the list is empty.
    pub fn read(path: &Path, timesteps: &[u64]) -> Result<Self> {
        let last_wanted = timesteps.iter().copied().max();
        let mut snapshots = Vec::new();
        for snapshot in DumpReader::open(path)? {
            let snapshot = snapshot?;
            if let Some(last_wanted) = last_wanted {
                if snapshot.step > last_wanted {
                    break;
                }
                if !timesteps.contains(&snapshot.step) {
                    continue;
                }
            }
            snapshots.push(snapshot);
        }
        Ok(Self::new(snapshots))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| {
            for snapshot in &self.snapshots {
                snapshot.write(w)?;
            }
            Ok(())
        })
    }

    #[must_use]
    pub fn get_snapshots(&self) -> &[DumpSnapshot] {
        &self.snapshots
    }

    #[must_use]
    pub fn last(&self) -> Option<&DumpSnapshot> {
        self.snapshots.last()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_float_eq::assert_f64_near;
    use std::fs;
    use std::io::Cursor;

    pub(crate) const TWO_SNAPSHOTS: &str = "\
ITEM: TIMESTEP
0
ITEM: NUMBER OF ATOMS
3
ITEM: BOX BOUNDS pp pp pp
-10 10
-10 10
-7.5 7.5
ITEM: ATOMS id type mol x y z c_rod_cluster
10 1 100 0.5 0.25 0 1
11 3 0 1.5 -0.25 0 1
12 1 101 -4.125 3 2 2
ITEM: TIMESTEP
200
ITEM: NUMBER OF ATOMS
3
ITEM: BOX BOUNDS pp pp pp
-10 10
-10 10
-7.5 7.5
ITEM: ATOMS id type mol x y z c_rod_cluster
10 1 100 0.5 0.25 0 1
11 3 0 1.5 -0.25 0 1
12 1 101 0.75 0.5 0 1
";

    pub(crate) fn read_all(text: &str) -> Result<Vec<DumpSnapshot>> {
        DumpReader::new(Cursor::new(text.to_string())).collect()
    }

    fn parse_error(text: &str) -> ParseError {
        match read_all(text) {
            Err(Error::Parse(err)) => err,
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_snapshots() {
        let snapshots = read_all(TWO_SNAPSHOTS).unwrap();
        assert_eq!(snapshots.len(), 2);
        let first = &snapshots[0];
        assert_eq!(first.step, 0);
        assert_eq!(first.atoms_count, 3);
        assert_eq!(first.sym_box.boundaries, "pp pp pp");
        assert_f64_near!(first.sym_box.size()[2], 15.0);
        assert_eq!(
            first.get_keys(),
            ["id", "type", "mol", "x", "y", "z", "c_rod_cluster"]
        );
        assert_eq!(first.get_property("id").unwrap(), &[10.0, 11.0, 12.0]);
        assert_eq!(first.get_property("x").unwrap(), &[0.5, 1.5, -4.125]);
        assert_eq!(snapshots[1].step, 200);
        assert_eq!(snapshots[1].get_property("c_rod_cluster").unwrap(), &[1.0; 3]);
    }

    #[test]
    fn test_layout_may_change_between_snapshots() {
        let text = "\
ITEM: TIMESTEP
1
ITEM: NUMBER OF ATOMS
1
ITEM: BOX BOUNDS pp pp pp
0 1
0 1
0 1
ITEM: ATOMS id type
1 1

ITEM: TIMESTEP
2
ITEM: NUMBER OF ATOMS
1
ITEM: BOX BOUNDS pp pp pp
0 1
0 1
0 1
ITEM: ATOMS id type c_mem_cluster
1 1 4

";
        let snapshots = read_all(text).unwrap();
        assert!(!snapshots[0].has_property("c_mem_cluster"));
        assert_eq!(snapshots[1].get_property("c_mem_cluster").unwrap(), &[4.0]);
    }

    #[test]
    fn test_triclinic_box() {
        let text = "\
ITEM: TIMESTEP
5
ITEM: NUMBER OF ATOMS
0
ITEM: BOX BOUNDS xy xz yz pp pp ff
0 4 0.5
0 5 0
-1 1 0.25
ITEM: ATOMS id type
";
        let snapshots = read_all(text).unwrap();
        let sym_box = &snapshots[0].sym_box;
        assert_eq!(sym_box.boundaries, "pp pp ff");
        assert_eq!(sym_box.tilt, Some([0.5, 0.0, 0.25]));
        assert_eq!(sym_box.size(), [3.5, 4.75, 2.0]);
    }

    #[test]
    fn test_round_trip() {
        let snapshots = read_all(TWO_SNAPSHOTS).unwrap();
        let mut out = Vec::new();
        for snapshot in &snapshots {
            snapshot.write(&mut out).unwrap();
        }
        let reread = read_all(&String::from_utf8(out).unwrap()).unwrap();
        assert_eq!(reread, snapshots);
    }

    #[test]
    fn test_field_count_mismatch() {
        let text = TWO_SNAPSHOTS.replacen("11 3 0 1.5 -0.25 0 1", "11 3 0 1.5 -0.25 0", 1);
        let err = parse_error(&text);
        assert_eq!(err.line, 11);
        assert_eq!(
            err.kind,
            DumpParsingError::InvalidAtomRow {
                expected: 7,
                found: 6
            }
        );
    }

    #[test]
    fn test_truncated_snapshot() {
        let text = TWO_SNAPSHOTS
            .lines()
            .take(20)
            .collect::<Vec<_>>()
            .join("\n");
        let err = parse_error(&text);
        assert_eq!(err.kind, DumpParsingError::TruncatedSnapshot);
        assert_eq!(err.line, 20);
    }

    #[test]
    fn test_bad_headers() {
        let err = parse_error(&TWO_SNAPSHOTS.replacen("ITEM: TIMESTEP", "ITEM: STEP", 1));
        assert_eq!((err.line, err.kind), (1, DumpParsingError::InvalidOrMissingTimestep));

        let err = parse_error(&TWO_SNAPSHOTS.replacen("ITEM: BOX BOUNDS", "ITEM: BOX", 1));
        assert_eq!((err.line, err.kind), (5, DumpParsingError::MissingSymBox));

        let err = parse_error(&TWO_SNAPSHOTS.replacen("id type mol", "id type id", 1));
        assert_eq!(
            (err.line, err.kind),
            (9, DumpParsingError::DuplicateAtomKeys("id".to_string()))
        );

        let err = parse_error(&TWO_SNAPSHOTS.replacen("-4.125", "abc", 1));
        assert_eq!(
            (err.line, err.kind),
            (12, DumpParsingError::InvalidValue("abc".to_string()))
        );
    }

    #[test]
    fn test_atom_count_overflow() {
        let text = TWO_SNAPSHOTS.replacen(
            "NUMBER OF ATOMS\n3",
            &format!("NUMBER OF ATOMS\n{}", usize::MAX),
            1,
        );
        let err = parse_error(&text);
        assert_eq!((err.line, err.kind), (9, DumpParsingError::InvalidOrMissingNumberOfAtoms));
    }

    #[test]
    fn test_atom_count_beyond_file() {
        let text = TWO_SNAPSHOTS
            .lines()
            .take(12)
            .collect::<Vec<_>>()
            .join("\n")
            .replacen("NUMBER OF ATOMS\n3", "NUMBER OF ATOMS\n100000000000", 1);
        let err = parse_error(&text);
        assert_eq!((err.line, err.kind), (12, DumpParsingError::TruncatedSnapshot));
    }

    #[test]
    fn test_decreasing_timestep() {
        let text = TWO_SNAPSHOTS
            .replacen("200", "0", 1)
            .replacen("ITEM: TIMESTEP\n0", "ITEM: TIMESTEP\n300", 1);
        let err = parse_error(&text);
        assert_eq!(
            err.kind,
            DumpParsingError::DecreasingTimestep {
                previous: 300,
                step: 0
            }
        );
    }

    #[test]
    fn test_reader_stops_after_error() {
        let text = TWO_SNAPSHOTS.replacen("NUMBER OF ATOMS\n3", "NUMBER OF ATOMS\nx", 1);
        let mut reader = DumpReader::new(Cursor::new(text));
        assert!(matches!(reader.next(), Some(Err(Error::Parse(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_dump_file_read_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dump");
        fs::write(&path, TWO_SNAPSHOTS).unwrap();

        let dump = DumpFile::read(&path, &[200]).unwrap();
        assert_eq!(dump.get_snapshots().len(), 1);
        assert_eq!(dump.last().unwrap().step, 200);

        let dump = DumpFile::read(&path, &[]).unwrap();
        let saved = dir.path().join("saved.dump");
        dump.save(&saved).unwrap();
        assert_eq!(fs::read_to_string(&saved).unwrap(), TWO_SNAPSHOTS);
    }

    #[test]
    fn test_read_last_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dump");
        fs::write(&path, TWO_SNAPSHOTS).unwrap();
        assert_eq!(read_last_snapshot(&path).unwrap().step, 200);

        fs::write(&path, "\n").unwrap();
        assert!(matches!(read_last_snapshot(&path), Err(Error::EmptyDump)));
    }
}
