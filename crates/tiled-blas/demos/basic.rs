//! Basic example: a symmetric rank-k update on one process and a
//! distributed multiply across four in-process ranks.

use std::sync::Arc;
use std::thread;
use tiled_blas::prelude::*;
use tiled_blas::{DeviceSet, ThreadComm};

fn main() -> Result<()> {
    println!("Tiled BLAS - Basic Example\n");

    // C = A A^T for a 6x4 A stored in 2x2 tiles
    let ctx = Context::local();
    let dist = Distribution::single();
    let a = Matrix::from_fn(6, 4, 2, dist, Arc::clone(&ctx), |i, j| (i + j) as f64)?;
    let c = SymmetricMatrix::new(Uplo::Lower, 6, 2, dist, ctx)?;
    c.insert_local_tiles()?;

    println!("Matrix A (6x4):");
    print_matrix(&a.to_dense(), 6, 4);

    syrk(1.0, &a, 0.0, &c, &Options::new().with_target(Target::HostTask))?;
    println!("\nLower triangle of C = A A^T:");
    print_lower(&c.to_dense(), 6);

    // The same product on a 2x2 process grid, one thread per rank
    println!("\n--- Distributed GEMM on a 2x2 grid ---\n");
    let handles: Vec<_> = ThreadComm::world(4)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || -> Result<Vec<f64>> {
                let ctx = Context::new(Arc::new(comm), DeviceSet::new(1, 2)?);
                let dist = Distribution::new(2, 2)?;
                let a = Matrix::from_fn(6, 4, 2, dist, Arc::clone(&ctx), |i, j| (i + j) as f64)?;
                let b = Matrix::from_fn(6, 4, 2, dist, Arc::clone(&ctx), |i, j| (i + j) as f64)?;
                let at = transpose(&b)?;
                let c = Matrix::<f64>::zeros(6, 6, 2, dist, ctx)?;
                let opts = Options::new().with_target(Target::Devices).with_lookahead(1);
                gemm(1.0, &a, &at, 0.0, &c, &opts)?;
                Ok(c.to_dense())
            })
        })
        .collect();

    let mut full = vec![0.0; 36];
    for handle in handles {
        let part = handle.join().map_err(|_| Error::InvalidArgument {
            arg: "rank",
            reason: "thread panicked".to_string(),
        })??;
        for (x, y) in full.iter_mut().zip(part) {
            *x += y;
        }
    }
    println!("C = A A^T assembled from four ranks:");
    print_matrix(&full, 6, 6);

    Ok(())
}

fn print_matrix(data: &[f64], rows: usize, cols: usize) {
    for i in 0..rows {
        print!("  [");
        for j in 0..cols {
            print!("{:6.1}", data[i + j * rows]);
        }
        println!(" ]");
    }
}

fn print_lower(data: &[f64], n: usize) {
    for i in 0..n {
        print!("  [");
        for j in 0..=i {
            print!("{:6.1}", data[i + j * n]);
        }
        println!(" ]");
    }
}
