//! # molmech Core Library
//!
//! A molecular-mechanics force-field subsystem designed to plug into a
//! multibody dynamics host. Atoms are grouped rigidly onto moving bodies;
//! the subsystem computes the classical potential energy and per-body
//! spatial forces (torque + force at the body origin, in the ground frame)
//! that the host integrates forward in time.
//!
//! Units are uniformly MD units: nanometers, daltons, picoseconds, with
//! energy in kJ/mol and charge in units of the proton charge. Angles are
//! accepted in degrees at the API boundary and used in radians internally.
//!
//! ## Architectural Philosophy
//!
//! The library is split into two layers with a strict dependency direction:
//!
//! - **[`core`]: The Foundation.** Stateless data models (elements, atoms,
//!   bonds, clusters, body views) and pure force-field mathematics
//!   (vdW combining rules, bend and torsion geometry kernels).
//!
//! - **[`engine`]: The Subsystem.** The stateful layer: parameter
//!   registries, the cluster tree, topology realization, the force/energy
//!   kernel, the implicit-solvent bridge, and parameter-script persistence.

pub mod core;
pub mod engine;
