use anyhow::{bail, Context, Result};
use clap::Parser;
use garment_cutout::pipeline::{decode_image, DEFAULT_BOX_THRESHOLD, DEFAULT_TEXT_THRESHOLD};
use garment_cutout::{detection, segmentation};
use garment_cutout::{BoundingBox, CutoutResponse, Pipeline, PipelineConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Photo to extract clothing from
    input: PathBuf,

    /// Grounding DINO detector (ONNX file)
    #[arg(long, default_value = "models/grounding_dino_tiny.onnx")]
    detector_model: PathBuf,

    /// BERT vocabulary used to tokenize detector prompts
    #[arg(long, default_value = "models/vocab.txt")]
    tokenizer_vocab: PathBuf,

    /// SAM 2.1 segmenter (ONNX file)
    #[arg(long, default_value = "models/sam2.1_tiny.onnx")]
    segmenter_model: PathBuf,

    /// Detection label phrase; repeat to replace the built-in clothing vocabulary
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Minimum region confidence
    #[arg(long, default_value_t = DEFAULT_BOX_THRESHOLD)]
    box_threshold: f32,

    /// Minimum token confidence for a phrase to label a region
    #[arg(long, default_value_t = DEFAULT_TEXT_THRESHOLD)]
    text_threshold: f32,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Segment this region (x,y,width,height) instead of running detection
    #[arg(long, value_name = "X,Y,W,H")]
    r#box: Option<String>,

    /// Write the cutout PNG here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            vocabulary: if self.labels.is_empty() {
                defaults.vocabulary
            } else {
                self.labels.clone()
            },
            box_threshold: self.box_threshold,
            text_threshold: self.text_threshold,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Parse `x,y,width,height`.
fn parse_box(value: &str, width: u32, height: u32) -> Result<BoundingBox> {
    let values = value
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid box {value:?}, expected X,Y,W,H"))?;
    let [x, y, w, h] = values[..] else {
        bail!("Invalid box {value:?}, expected four values X,Y,W,H");
    };
    Ok(BoundingBox::from_xywh(x, y, w, h, width, height)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for the JSON response
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("garment-cutout starting");

    let config = args.pipeline_config();
    config.validate().context("Invalid pipeline configuration")?;

    // Models are loaded once and shared by every request
    let detector = detection::create_default_detector(&args.detector_model, &args.tokenizer_vocab)
        .context("Failed to load detector")?;
    let segmenter = segmentation::create_default_segmenter(&args.segmenter_model)
        .context("Failed to load segmenter")?;
    let pipeline = Pipeline::new(detector, segmenter, config)?;

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let image = decode_image(&bytes)?;
    tracing::info!("Input: {}x{}", image.width(), image.height());

    let result = match &args.r#box {
        Some(region) => {
            let bbox = parse_box(region, image.width(), image.height())?;
            pipeline.run_with_box(image, bbox).await
        }
        None => pipeline.run(image).await,
    };

    println!("{}", serde_json::to_string(&CutoutResponse::from(&result))?);

    match result {
        Ok(encoded) => {
            if let Some(path) = &args.output {
                std::fs::write(path, &encoded.png)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!("Wrote {}x{} cutout to {}", encoded.width, encoded.height, path.display());
            }
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}
