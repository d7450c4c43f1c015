use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};

use itertools::Itertools;

use crate::error::{Error, Result};

pub(crate) const HEADER_TIMESTEP: &str = "ITEM: TIMESTEP";
pub(crate) const HEADER_NUM_OF_ATOMS: &str = "ITEM: NUMBER OF ATOMS";
pub(crate) const HEADER_SYM_BOX: &str = "ITEM: BOX BOUNDS";
pub(crate) const HEADER_ATOMS: &str = "ITEM: ATOMS";

/// Simulation box as written in the `BOX BOUNDS` block.
#[derive(Debug, Clone, PartialEq)]
pub struct SymBox {
    /// Boundary flags following the header, e.g. `pp pp pp`.
    pub boundaries: String,
    pub xlo: f64,
    pub xhi: f64,
    pub ylo: f64,
    pub yhi: f64,
    pub zlo: f64,
    pub zhi: f64,
    /// `xy xz yz` tilt factors of a triclinic box.
    pub tilt: Option<[f64; 3]>,
}

impl SymBox {
    pub fn new(boundaries: &str, bounds: [[f64; 2]; 3]) -> Self {
        Self {
            boundaries: boundaries.to_string(),
            xlo: bounds[0][0],
            xhi: bounds[0][1],
            ylo: bounds[1][0],
            yhi: bounds[1][1],
            zlo: bounds[2][0],
            zhi: bounds[2][1],
            tilt: None,
        }
    }

    pub fn bounds(&self) -> [[f64; 2]; 3] {
        [
            [self.xlo, self.xhi],
            [self.ylo, self.yhi],
            [self.zlo, self.zhi],
        ]
    }

    /// Edge lengths of the simulation cell.
    ///
    /// For a triclinic box the stored bounds are those of the bounding box, so
    /// the tilt contributions are taken off first.
    pub fn size(&self) -> [f64; 3] {
        let Some([xy, xz, yz]) = self.tilt else {
            return [self.xhi - self.xlo, self.yhi - self.ylo, self.zhi - self.zlo];
        };
        let x_shifts = [0.0, xy, xz, xy + xz];
        let x_min = x_shifts.into_iter().fold(f64::INFINITY, f64::min);
        let x_max = x_shifts.into_iter().fold(f64::NEG_INFINITY, f64::max);
        [
            (self.xhi - x_max) - (self.xlo - x_min),
            (self.yhi - yz.max(0.0)) - (self.ylo - yz.min(0.0)),
            self.zhi - self.zlo,
        ]
    }
}

/// One timestep of a dump file, stored column by column.
#[derive(Clone, PartialEq)]
pub struct DumpSnapshot {
    pub step: u64,
    pub atoms_count: usize,
    pub sym_box: SymBox,
    keys: Vec<String>,
    keys_map: HashMap<String, usize>,
    atoms: Vec<f64>,
}

impl DumpSnapshot {
    /// Creates a zero-filled snapshot. Keys are expected to be unique.
    pub fn new(keys: Vec<String>, step: u64, atoms_count: usize, sym_box: SymBox) -> Self {
        let keys_map = keys
            .iter()
            .enumerate()
            .map(|(j, key)| (key.clone(), j))
            .collect();
        Self {
            step,
            atoms_count,
            sym_box,
            atoms: vec![0.0; atoms_count * keys.len()],
            keys,
            keys_map,
        }
    }

    /// Builds a snapshot from row-major values, `keys.len()` per atom.
    pub fn from_rows(keys: Vec<String>, step: u64, sym_box: SymBox, rows: &[f64]) -> Self {
        let atoms_count = rows.len() / keys.len().max(1);
        let mut snapshot = Self::new(keys, step, atoms_count, sym_box);
        let keys_count = snapshot.keys.len();
        for (i, row) in rows.chunks_exact(keys_count.max(1)).enumerate() {
            for (j, value) in row.iter().enumerate() {
                snapshot.set_atom_value(j, i, *value);
            }
        }
        snapshot
    }

    pub fn get_keys(&self) -> &[String] {
        &self.keys
    }

    #[inline]
    pub fn get_property_index(&self, key: &str) -> Option<usize> {
        self.keys_map.get(key).copied()
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.keys_map.contains_key(key)
    }

    /// All values of one column, or `MissingAttribute` if the snapshot has no such key.
    pub fn get_property(&self, key: &str) -> Result<&[f64]> {
        let j = self
            .get_property_index(key)
            .ok_or_else(|| Error::MissingAttribute {
                attribute: key.to_string(),
                step: self.step,
            })?;
        let start = j * self.atoms_count;
        Ok(&self.atoms[start..start + self.atoms_count])
    }

    #[inline]
    pub fn get_atom_value(&self, property_index: usize, atom_index: usize) -> f64 {
        self.atoms[self.atoms_count * property_index + atom_index]
    }

    #[inline]
    pub fn set_atom_value(&mut self, property_index: usize, atom_index: usize, value: f64) {
        self.atoms[self.atoms_count * property_index + atom_index] = value;
    }

    /// Values of one atom in key order.
    pub fn get_record(&self, atom_index: usize) -> Vec<f64> {
        (0..self.keys.len())
            .map(|j| self.get_atom_value(j, atom_index))
            .collect()
    }

    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "{HEADER_TIMESTEP}")?;
        writeln!(w, "{}", self.step)?;
        writeln!(w, "{HEADER_NUM_OF_ATOMS}")?;
        writeln!(w, "{}", self.atoms_count)?;
        match self.sym_box.tilt {
            Some(tilt) => {
                writeln!(w, "{HEADER_SYM_BOX} xy xz yz {}", self.sym_box.boundaries)?;
                for ([lo, hi], t) in self.sym_box.bounds().into_iter().zip(tilt) {
                    writeln!(w, "{lo} {hi} {t}")?;
                }
            }
            None => {
                writeln!(w, "{HEADER_SYM_BOX} {}", self.sym_box.boundaries)?;
                for [lo, hi] in self.sym_box.bounds() {
                    writeln!(w, "{lo} {hi}")?;
                }
            }
        }
        writeln!(w, "{HEADER_ATOMS} {}", self.keys.join(" "))?;
        for i in 0..self.atoms_count {
            writeln!(w, "{}", self.get_record(i).iter().join(" "))?;
        }
        Ok(())
    }
}

impl fmt::Debug for DumpSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpSnapshot")
            .field("step", &self.step)
            .field("atoms_count", &self.atoms_count)
            .field("keys", &self.keys)
            .finish()
    }
}
