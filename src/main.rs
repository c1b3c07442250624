use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::bail;
use clap::Parser;
use lightpose::decode::PoseDecoder;
use lightpose::extrinsics::Extrinsics;
use lightpose::gui::{self, GuiInput};
use lightpose::nn::OnnxEngine;
use lightpose::pipeline::Pipeline;
use lightpose::playback::{AutoStep, Controller};
use lightpose::plot::Orbit;
use lightpose::render::{NullRenderer, Render, Viewer};
use lightpose::source;

/// Network stride of the pose model: its output grids are 1/8th of the input resolution.
const STRIDE: u32 = 8;

#[derive(Debug, Parser)]
#[command(about = "3D human pose estimation on a camera, animation, or image stream")]
struct Args {
    /// Path to the ONNX pose estimation model.
    #[arg(short, long)]
    model: PathBuf,

    /// Camera index, animation file, or one or more image paths.
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<String>,

    /// Inference device.
    #[arg(short, long, default_value = "CPU")]
    device: String,

    /// Network input height; frames are scaled to it before inference.
    #[arg(long, default_value_t = 256)]
    height_size: u32,

    /// JSON file with the camera rotation `R` and translation `t` used for the 3D view.
    #[arg(long)]
    extrinsics_path: Option<PathBuf>,

    /// Camera focal length; derived from the frame width when omitted.
    #[arg(long)]
    fx: Option<f32>,

    /// Run without windows and playback control.
    #[arg(long)]
    no_show: bool,
}

fn main() -> anyhow::Result<()> {
    lightpose::init_logger!();

    let args = Args::parse();
    if args.no_show {
        run(args)
    } else {
        gui::run(move || run(args))
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if args.height_size == 0 {
        bail!("--height-size must be greater than zero");
    }
    if let Some(fx) = args.fx {
        if fx <= 0.0 {
            bail!("--fx must be positive, got {fx}");
        }
    }

    // Classify the inputs before building anything so that configuration errors surface first.
    let kind = source::classify(&args.input)?;
    let extrinsics = args
        .extrinsics_path
        .as_deref()
        .map(Extrinsics::from_path)
        .transpose()?;

    let source = source::open(kind)?;
    let engine = OnnxEngine::load(&args.model, &args.device, STRIDE)?;
    let decoder = PoseDecoder::new(STRIDE, extrinsics);

    let (viewer, controller): (Box<dyn Render>, Controller) = if args.no_show {
        (Box::new(NullRenderer), Controller::new(Box::new(AutoStep)))
    } else {
        let orbit = Arc::new(Mutex::new(Orbit::new()));
        let input = GuiInput::new(orbit.clone());
        (
            Box::new(Viewer::new(orbit)),
            Controller::new(Box::new(input)),
        )
    };

    let mut pipeline = Pipeline::new(
        source,
        Box::new(engine),
        decoder,
        viewer,
        controller,
        args.height_size,
        args.fx,
    );
    let cycles = pipeline.run()?;
    log::info!("stream finished after {cycles} cycles");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
