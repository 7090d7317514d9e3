//! Global combination array
//!
//! The coordinator turns per-parameter samples into one row per case and
//! broadcasts the result. Every other worker only sizes its receive buffer.

use rand::Rng;
use tracing::{debug, info};

use crate::comm::Communicator;
use crate::error::{ConfigError, Result, ShapeError};
use crate::matrix::{CombinationArray, Matrix};
use crate::sampling::{SamplingCategory, SweepParameter, latin_hypercube};

/// Number of rows the combination array will have, computed without sampling.
///
/// Fails for random modes without a sample count, or when the Cartesian
/// product is too large to count.
pub fn expected_row_count(
    params: &[SweepParameter],
    category: SamplingCategory,
    num_samples: Option<usize>,
) -> Result<usize> {
    match category {
        SamplingCategory::Fixed => {
            let mut total: usize = 1;
            for param in params {
                let count = param.sampling.fixed_count().unwrap_or(0);
                total = total.checked_mul(count).ok_or(ShapeError::CountOverflow)?;
            }
            Ok(total)
        }
        SamplingCategory::Random | SamplingCategory::RandomLhs => {
            Ok(num_samples.ok_or(ConfigError::MissingSampleCount(category))?)
        }
    }
}

/// Cartesian product, last parameter varying fastest
fn cartesian_product(values: &[Vec<f64>], rows: usize) -> Result<Matrix> {
    let cols = values.len();
    let mut data = Vec::with_capacity(rows * cols);
    if rows == 0 {
        return Ok(Matrix::from_data(0, cols, data)?);
    }

    let mut indices = vec![0usize; cols];
    loop {
        data.extend(indices.iter().zip(values).map(|(&idx, v)| v[idx]));

        // Odometer increment from the rightmost digit
        let mut carry = true;
        for (index, v) in indices.iter_mut().zip(values).rev() {
            *index += 1;
            if *index < v.len() {
                carry = false;
                break;
            }
            *index = 0;
        }
        if carry {
            break;
        }
    }

    Ok(Matrix::from_data(rows, cols, data)?)
}

/// Build the combination array locally. Only the coordinator calls this.
pub fn enumerate_combinations<R: Rng + ?Sized>(
    params: &[SweepParameter],
    category: SamplingCategory,
    num_samples: Option<usize>,
    rng: &mut R,
) -> Result<CombinationArray> {
    let rows = expected_row_count(params, category, num_samples)?;

    let mut combos = match category {
        SamplingCategory::Fixed => {
            let mut values = Vec::with_capacity(params.len());
            for param in params {
                values.push(param.sampling.generate(&param.name, rows, rng)?);
            }
            cartesian_product(&values, rows)?
        }
        SamplingCategory::Random => {
            let mut columns = Vec::with_capacity(params.len());
            for param in params {
                columns.push(param.sampling.generate(&param.name, rows, rng)?);
            }
            Matrix::from_columns(&columns, rows)?
        }
        SamplingCategory::RandomLhs => {
            let mut bounds = Vec::with_capacity(params.len());
            for param in params {
                let pair = param.sampling.generate(&param.name, rows, rng)?;
                bounds.push((pair[0], pair[1]));
            }
            Matrix::from_rows(&latin_hypercube(&bounds, rows, rng), params.len())?
        }
    };

    if category != SamplingCategory::Fixed {
        combos.sort_rows_by_column(0);
    }
    Ok(combos)
}

/// Build the combination array on rank 0 and broadcast it to the group.
///
/// Configuration is validated on every rank before the broadcast, so a bad
/// sweep fails everywhere instead of stalling the other workers.
pub fn build_combinations<R: Rng + ?Sized>(
    params: &[SweepParameter],
    category: SamplingCategory,
    num_samples: Option<usize>,
    rng: &mut R,
    comm: &dyn Communicator,
) -> Result<CombinationArray> {
    for param in params {
        param.sampling.validate(&param.name)?;
    }
    let rows = expected_row_count(params, category, num_samples)?;
    let cols = params.len();
    let len = rows.checked_mul(cols).ok_or(ShapeError::CountOverflow)?;

    let mut buf = if comm.is_coordinator() {
        let combos = enumerate_combinations(params, category, num_samples, rng)?;
        info!(
            category = %category,
            cases = combos.rows(),
            parameters = cols,
            "built combination array"
        );
        combos.into_data()
    } else {
        vec![0.0; len]
    };

    if comm.size() > 1 {
        comm.broadcast_f64(&mut buf, 0)?;
        debug!(rank = comm.rank(), len, "received combination array");
    }

    Ok(Matrix::from_data(rows, cols, buf)?)
}
