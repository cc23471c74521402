//! Execution planning for distributed tensor contraction.
//!
//! This crate provides the two pieces a scheduler needs to pick an algorithm and a
//! processor arrangement:
//!
//! - [`topology`]: Cartesian process grids with one communication group per axis,
//!   and [`fold_torus`](topology::folding::fold_torus), which derives all grids with
//!   one dimension less by merging adjacent axes.
//! - [`costmodel`]: execution time estimators that calibrate themselves from
//!   measurements using a distributed, regularized least-squares fit.
//!
//! Communication between ranks goes through the [`collective::Collective`] trait,
//! implemented for MPI communicators (feature `mpi`) and for simulated ranks on
//! threads ([`collective::threaded::ThreadGroup`]).

pub mod collective;
pub mod costmodel;
pub mod error;
pub mod linalg;
pub mod logging;
pub mod topology;
