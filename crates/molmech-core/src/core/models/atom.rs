//! Atoms and bonds.
//!
//! An atom is born with a charged atom type and grows state in two waves:
//! a body assignment and station once it (or a containing cluster) attaches
//! to a host body, and a family of derived neighborhood and parameter
//! caches at topology realization.

use crate::core::forcefield::params::{BondBend, BondStretch, BondTorsion};
use crate::core::models::body::HostBodyIndex;
use crate::core::models::ids::{AtomId, ChargedTypeId};
use crate::core::models::tuples::{Pair, Quad, Triple};
use nalgebra::Point3;

/// One atom in the subsystem.
///
/// The neighborhood lists come in two families that must not be conflated.
/// The `bond1N` lists record *every* simple path of the given length out of
/// this atom; a torsion can arise from several distinct paths to the same
/// partner, and bonded-term evaluation walks all of them. The
/// `short_path1N` lists record the single *shortest* path to each reachable
/// atom, with each target appearing in at most one of the three lists;
/// nonbonded scaling keys off these so a pair reachable by several routes
/// is never scaled twice.
///
/// The `x`-prefixed variants keep only tuples that span at least two
/// bodies; tuples internal to a rigid body produce no relative motion and
/// are skipped wholesale.
#[derive(Debug, Clone)]
pub struct Atom {
    pub atom_id: AtomId,
    pub charged_type: ChargedTypeId,
    /// Directly bonded (1-2) atoms. Sorted at realization.
    pub bond12: Vec<AtomId>,

    /// Host body this atom rides on, once attached.
    pub body: Option<HostBodyIndex>,
    /// Station fixed in the body frame, nm.
    pub station: Point3<f64>,

    // Realization caches. The current atom is always atom "1" of each
    // tuple and is not stored; a bond13 entry holds [the intermediate, the
    // 1-3 partner], and so on.
    pub bond13: Vec<Pair<AtomId>>,
    pub bond14: Vec<Triple<AtomId>>,
    pub bond15: Vec<Quad<AtomId>>,
    pub short_path13: Vec<Pair<AtomId>>,
    pub short_path14: Vec<Triple<AtomId>>,
    pub short_path15: Vec<Quad<AtomId>>,

    /// Set when this atom is bonded to exactly three others; the candidate
    /// center of an improper torsion.
    pub bonds3_atoms: Option<Triple<AtomId>>,

    pub xbond12: Vec<AtomId>,
    pub xbond13: Vec<Pair<AtomId>>,
    pub xbond14: Vec<Triple<AtomId>>,
    pub xbond15: Vec<Quad<AtomId>>,
    pub xshort_path13: Vec<Pair<AtomId>>,
    pub xshort_path14: Vec<Triple<AtomId>>,
    pub xshort_path15: Vec<Quad<AtomId>>,
    pub xbonds3_atoms: Option<Triple<AtomId>>,

    /// Bonded parameters resolved at realization, parallel to the
    /// cross-body lists: stretch to xbond12, bend to xbond13, torsion to
    /// xbond14.
    pub stretch: Vec<BondStretch>,
    pub bend: Vec<BondBend>,
    pub torsion: Vec<BondTorsion>,

    /// Matched improper-torsion orderings (neighbor, neighbor, neighbor;
    /// this atom sits in the third slot of the class quad) and their terms,
    /// amplitudes already divided by the number of matches.
    pub improper_atoms: Vec<Triple<AtomId>>,
    pub improper: Vec<BondTorsion>,
}

impl Atom {
    pub fn new(atom_id: AtomId, charged_type: ChargedTypeId) -> Self {
        Self {
            atom_id,
            charged_type,
            bond12: Vec::new(),
            body: None,
            station: Point3::origin(),
            bond13: Vec::new(),
            bond14: Vec::new(),
            bond15: Vec::new(),
            short_path13: Vec::new(),
            short_path14: Vec::new(),
            short_path15: Vec::new(),
            bonds3_atoms: None,
            xbond12: Vec::new(),
            xbond13: Vec::new(),
            xbond14: Vec::new(),
            xbond15: Vec::new(),
            xshort_path13: Vec::new(),
            xshort_path14: Vec::new(),
            xshort_path15: Vec::new(),
            xbonds3_atoms: None,
            stretch: Vec::new(),
            bend: Vec::new(),
            torsion: Vec::new(),
            improper_atoms: Vec::new(),
            improper: Vec::new(),
        }
    }

    pub fn is_attached_to_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn attach_to_body(&mut self, body: HostBodyIndex, station: Point3<f64>) {
        debug_assert!(!self.is_attached_to_body());
        self.body = Some(body);
        self.station = station;
    }

    pub fn is_bonded_to(&self, other: AtomId) -> bool {
        self.bond12.contains(&other)
    }

    pub fn invalidate_topological_cache(&mut self) {
        self.bond13.clear();
        self.bond14.clear();
        self.bond15.clear();
        self.short_path13.clear();
        self.short_path14.clear();
        self.short_path15.clear();
        self.bonds3_atoms = None;
        self.xbond12.clear();
        self.xbond13.clear();
        self.xbond14.clear();
        self.xbond15.clear();
        self.xshort_path13.clear();
        self.xshort_path14.clear();
        self.xshort_path15.clear();
        self.xbonds3_atoms = None;
        self.stretch.clear();
        self.bend.clear();
        self.torsion.clear();
        self.improper_atoms.clear();
        self.improper.clear();
    }
}

/// An undirected bond, stored with the lower atom index first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub atoms: Pair<AtomId>,
}

impl Bond {
    pub fn new(atom1: AtomId, atom2: AtomId) -> Self {
        Self {
            atoms: Pair::canonical(atom1, atom2),
        }
    }

    pub fn contains(&self, atom: AtomId) -> bool {
        self.atoms.0[0] == atom || self.atoms.0[1] == atom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_atom_has_no_body_and_empty_caches() {
        let atom = Atom::new(AtomId(3), ChargedTypeId(1));
        assert!(!atom.is_attached_to_body());
        assert!(atom.bond12.is_empty());
        assert!(atom.bond13.is_empty());
        assert!(atom.bonds3_atoms.is_none());
    }

    #[test]
    fn attach_to_body_records_station() {
        let mut atom = Atom::new(AtomId(0), ChargedTypeId(0));
        atom.attach_to_body(2, Point3::new(0.1, 0.2, 0.3));
        assert_eq!(atom.body, Some(2));
        assert_eq!(atom.station, Point3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn invalidation_clears_every_derived_list() {
        let mut atom = Atom::new(AtomId(0), ChargedTypeId(0));
        atom.bond13.push(Pair::new(AtomId(1), AtomId(2)));
        atom.xbond12.push(AtomId(1));
        atom.bonds3_atoms = Some(Triple::new(AtomId(1), AtomId(2), AtomId(3)));
        atom.invalidate_topological_cache();
        assert!(atom.bond13.is_empty());
        assert!(atom.xbond12.is_empty());
        assert!(atom.bonds3_atoms.is_none());
        // The permanent 1-2 adjacency survives invalidation.
        assert!(atom.bond12.is_empty());
    }

    #[test]
    fn bond_canonicalizes_low_first() {
        let bond = Bond::new(AtomId(5), AtomId(2));
        assert_eq!(bond.atoms, Pair::new(AtomId(2), AtomId(5)));
        assert!(bond.contains(AtomId(5)));
        assert!(bond.contains(AtomId(2)));
        assert!(!bond.contains(AtomId(3)));
    }
}
