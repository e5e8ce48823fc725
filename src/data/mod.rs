mod basemap;
mod places;

pub use basemap::{generate_coarse_coastline, load_basemap};
pub use places::{City, Dataset, Place};

#[cfg(test)]
pub(crate) use places::tests::sample;
