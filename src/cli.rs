use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone)]
#[command(name = "snirf2nwb")]
#[command(about = "Convert a BIDS fNIRS dataset of SNIRF recordings to NWB Zarr stores")]
pub struct Args {
    #[arg(help = "BIDS dataset root containing dataset_description.json and sub-* directories")]
    pub dataset_root: PathBuf,

    #[arg(help = "Directory to write the converted .nwb stores into")]
    pub output_root: PathBuf,
}
