//! Dataset assembly from many per-run feature matrices

mod assembler;


pub use assembler::{
    label_distribution, AssemblerConfig, AssemblyReport, CombinedTable, DatasetAssembler,
    DatasetRow, DatasetSplit, LabelStat, DEFAULT_SHUFFLE_SEED, DEFAULT_TEST_FRACTION,
};
