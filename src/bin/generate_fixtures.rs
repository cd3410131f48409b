use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use ndarray::Array;

use dnnbrain_fileio::{
    Activation, ActivationFile, DimKey, LayerActivation, LayerMask, Mask, MaskFile, Stimulus,
    StimulusFile, StimulusTable, StimulusType,
};

/// Deterministic stand-in for a post-ReLU unit response: non-negative and
/// sparse, varying with both the stimulus and the unit.
fn response(stim: usize, unit: usize) -> f64 {
    let phase = (stim * 7919 + unit * 104_729) as f64;
    (phase * 0.618_033_988_75).sin().max(0.0)
}

/// Fixture root: first CLI argument, else `$DNNBRAIN_DATA`, else `./data`.
fn fixture_root() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("DNNBRAIN_DATA"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn stimulus() -> Result<Stimulus> {
    let ids = vec![
        "n01930112_19568.JPEG",
        "n03733281_29214.JPEG",
        "n07695742_5848.JPEG",
        "n02992211_13244.JPEG",
    ];
    let n = ids.len() as i64;
    let data = StimulusTable::new()
        .with_column("stimID", ids)?
        .with_column("onset", (0..n).map(|i| i * 10).collect::<Vec<_>>())?
        .with_column("duration", vec![1i64; n as usize])?
        .with_column("label", vec!["nematode", "maze", "pretzel", "cardigan"])?
        .with_column("RT", vec![3.6309, 4.2031, 2.8125, 3.0469])?;

    let mut stim = Stimulus::new(StimulusType::Image, data);
    stim.path = Some("/nfs/s2/dnnbrain_data/test/image/images".to_string());
    stim.title = Some("ImageNet images in all 5000scenes runs of sub-CSI1_ses-01".to_string());
    Ok(stim)
}

fn activation(n_stim: usize) -> Activation {
    let mut act = Activation::new();
    // conv5: 256 channels of 13x13, flattened per stimulus.
    let conv5_shape = vec![n_stim, 256, 13, 13];
    let conv5 = Array::from_shape_fn((n_stim, 256 * 13 * 13), |(s, u)| response(s, u));
    act.insert("conv5", LayerActivation::new(conv5, conv5_shape));

    let fc3 = Array::from_shape_fn((n_stim, 1000, 1, 1), |(s, u, _, _)| response(s, u));
    act.insert("fc3", LayerActivation::from_array(fc3));
    act
}

fn mask() -> Mask {
    let mut mask = Mask::new();
    mask.insert(
        "conv5",
        LayerMask::new()
            .with(DimKey::Chn, vec![1, 2, 3])
            .with(DimKey::Row, vec![4, 5])
            .with(DimKey::Col, vec![6, 7, 8]),
    );
    mask.insert("fc3", LayerMask::new().with(DimKey::Chn, vec![1, 2, 3]));
    mask
}

fn main() -> Result<()> {
    env_logger::init();

    let test_dir = fixture_root().join("test");
    let image_dir = test_dir.join("image");
    std::fs::create_dir_all(&image_dir)
        .with_context(|| format!("creating {}", image_dir.display()))?;

    let stim = stimulus()?;
    let stim_path = image_dir.join("sub-CSI1_ses-01_imagenet.stim.csv");
    StimulusFile::new(&stim_path)
        .write_stimulus(&stim)
        .context("writing stimulus fixture")?;

    let act = activation(stim.data.n_rows());
    let act_path = image_dir.join("sub-CSI1_ses-01_imagenet.act.h5");
    ActivationFile::new(&act_path)
        .write(&act)
        .context("writing activation fixture")?;

    let mask_path = test_dir.join("alexnet.dmask.csv");
    MaskFile::new(&mask_path)
        .write(&mask())
        .context("writing mask fixture")?;

    for path in [&stim_path, &act_path, &mask_path] {
        info!("wrote {}", path.display());
    }
    println!("Wrote fixtures to {}", test_dir.display());
    Ok(())
}
