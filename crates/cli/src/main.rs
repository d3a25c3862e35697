use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{ImageDecoder, ImageReader};
use serde::Serialize;

use facetrace_core::detection::domain::detection_options::DetectionOptions;
use facetrace_core::detection::domain::face::Face;
use facetrace_core::recognition::domain::face_template::{FaceTemplate, TemplateVersion};
use facetrace_core::recognition::domain::recognizable::RecognitionData;
use facetrace_core::shared::pixel_buffer::{ImageFormat, PixelBuffer};
use facetrace_core::{Engine, Settings};

/// Face detection, tracking and template comparison.
#[derive(Parser)]
#[command(name = "facetrace", version)]
struct Cli {
    /// Directory holding the ONNX models (defaults to the platform data dir).
    #[arg(long, global = true)]
    models: Option<PathBuf>,

    /// JSON settings file; absent fields keep their defaults.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Override the face detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect faces in an image and print them as JSON.
    Detect {
        image: PathBuf,

        /// Maximum number of faces (0 = all).
        #[arg(long, default_value = "0")]
        limit: i32,

        #[command(flatten)]
        options: DetectFlags,
    },
    /// Extract a template from the best (or selected) face of an image.
    Extract {
        image: PathBuf,

        /// Where to write the binary template.
        output: PathBuf,

        /// Index of the face in detection order.
        #[arg(long, default_value = "0")]
        face: usize,

        /// Template version (defaults to the configured default version).
        #[arg(long)]
        version: Option<VersionArg>,
    },
    /// Compare template files and print the best score.
    Compare {
        /// Subject template files.
        #[arg(required = true, num_args = 1..)]
        subjects: Vec<PathBuf>,

        /// Candidate template files.
        #[arg(long, required = true, num_args = 1..)]
        candidates: Vec<PathBuf>,
    },
    /// Print brightness, contrast and sharpness of an image.
    Quality { image: PathBuf },
    /// Track a face through a sequence of images, in the given order.
    Track {
        #[arg(required = true, num_args = 1..)]
        frames: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct DetectFlags {
    /// Skip the featureless-frame pre-filter.
    #[arg(long)]
    skip_prefilter: bool,

    /// Attach a default-version template to each face.
    #[arg(long)]
    extract_templates: bool,

    /// Accept only the small roll/yaw ranges.
    #[arg(long)]
    no_pose_compensation: bool,

    /// Double the minimum face size.
    #[arg(long)]
    reduce_size_range: bool,
}

impl From<&DetectFlags> for DetectionOptions {
    fn from(flags: &DetectFlags) -> Self {
        Self {
            skip_prefilter: flags.skip_prefilter,
            extract_templates: flags.extract_templates,
            disable_pose_compensation: flags.no_pose_compensation,
            reduce_size_range: flags.reduce_size_range,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum VersionArg {
    V16,
    V20,
    V20a,
}

impl From<VersionArg> for TemplateVersion {
    fn from(arg: VersionArg) -> Self {
        match arg {
            VersionArg::V16 => TemplateVersion::V16,
            VersionArg::V20 => TemplateVersion::V20,
            VersionArg::V20a => TemplateVersion::V20A,
        }
    }
}

/// An image decoded to packed RGB, plus its EXIF orientation tag.
struct DecodedImage {
    rgb: Vec<u8>,
    width: u32,
    height: u32,
    orientation: u32,
}

impl DecodedImage {
    fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut decoder = ImageReader::open(path)?
            .with_guessed_format()?
            .into_decoder()?;
        let orientation = decoder.orientation()?.to_exif() as u32;
        let rgb = image::DynamicImage::from_decoder(decoder)?.into_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Self {
            rgb: rgb.into_raw(),
            width,
            height,
            orientation,
        })
    }

    fn buffer(&self) -> PixelBuffer<'_> {
        PixelBuffer::packed(&self.rgb, self.width, self.height, ImageFormat::Rgb)
            .with_orientation(self.orientation)
    }
}

#[derive(Serialize)]
struct TrackedFrame<'a> {
    frame: usize,
    path: &'a Path,
    face: Option<Face>,
}

#[derive(Serialize)]
struct ComparisonReport {
    score: f32,
    threshold: f32,
    authenticated: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let engine = Engine::initialize(settings)?;

    match &cli.command {
        Command::Detect {
            image,
            limit,
            options,
        } => {
            let decoded = DecodedImage::open(image)?;
            let faces = engine.detect_faces(&decoded.buffer(), *limit, &options.into())?;
            log::info!("Found {} face(s) in {}", faces.len(), image.display());
            print_json(&faces)?;
        }
        Command::Extract {
            image,
            output,
            face,
            version,
        } => {
            let decoded = DecodedImage::open(image)?;
            let buffer = decoded.buffer();
            let faces = engine.detect_faces(&buffer, 0, &DetectionOptions::default())?;
            let selected = faces.get(*face).ok_or_else(|| {
                format!(
                    "face index {face} out of range, {} face(s) detected",
                    faces.len()
                )
            })?;
            let template = match version {
                Some(v) => engine.extract_template_with_version(selected, &buffer, (*v).into())?,
                None => engine.extract_template(selected, &buffer)?,
            };
            std::fs::write(output, template.to_bytes())?;
            log::info!(
                "Wrote {:?} template ({} values) to {}",
                template.version(),
                template.len(),
                output.display()
            );
        }
        Command::Compare {
            subjects,
            candidates,
        } => {
            let subjects = read_templates(subjects)?;
            let candidates = read_templates(candidates)?;
            let score = engine.compare(&subjects, &candidates)?;
            let threshold = engine.authentication_score_threshold();
            print_json(&ComparisonReport {
                score,
                threshold,
                authenticated: score >= threshold,
            })?;
        }
        Command::Quality { image } => {
            let decoded = DecodedImage::open(image)?;
            print_json(&engine.quality_params(&decoded.buffer())?)?;
        }
        Command::Track { frames } => {
            let mut session = engine.start_tracking();
            let mut report = Vec::with_capacity(frames.len());
            for (index, path) in frames.iter().enumerate() {
                let decoded = DecodedImage::open(path)?;
                let face = engine.track_face(&mut session, &decoded.buffer())?;
                report.push(TrackedFrame {
                    frame: index,
                    path,
                    face,
                });
            }
            print_json(&report)?;
        }
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.settings {
        Some(path) => Settings::from_json(&std::fs::read_to_string(path)?)?,
        None => Settings::default(),
    };
    if let Some(models) = &cli.models {
        settings.models_location = Some(models.clone());
    }
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(
                format!("Confidence must be between 0.0 and 1.0, got {confidence}").into(),
            );
        }
        settings.confidence_threshold = confidence;
    }
    Ok(settings)
}

/// Stored templates carry their version in the header.
fn read_templates(paths: &[PathBuf]) -> Result<Vec<RecognitionData>, Box<dyn std::error::Error>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)?;
            let version = FaceTemplate::from_bytes(&bytes)
                .map_err(|e| format!("{}: {e}", path.display()))?
                .version();
            Ok(RecognitionData::new(bytes, version))
        })
        .collect()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
