use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use neuraface_core::{EmbeddingExtractor, FaceDetector, FaceRecognizer};
use neuraface_store::{AttendanceRow, Store, StudentSummary};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod register;
mod scan;

use config::Config;

#[derive(Parser)]
#[command(name = "neuraface", about = "Face recognition attendance")]
struct Cli {
    /// Camera device, overriding NEURAFACE_CAMERA_DEVICE
    #[arg(long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a student from the camera or an image file
    Register {
        /// Unique student id
        #[arg(long)]
        id: String,
        /// Student name
        #[arg(long)]
        name: String,
        /// Read the face from this image instead of the camera
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Scan faces and mark attendance
    Scan {
        /// Write the annotated frame here whenever a student is locked
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Show attendance for a day
    Report {
        /// Day to report (YYYY-MM-DD), today if omitted
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List registered students, or export one student's face image
    Students {
        /// Student whose registered face image to export
        #[arg(long, requires = "out")]
        image: Option<String>,
        /// Where to write the exported PNG
        #[arg(long, requires = "image")]
        out: Option<PathBuf>,
    },
}

type Extractor = EmbeddingExtractor<FaceDetector, FaceRecognizer>;

/// Load both ONNX models and wire them into an extractor.
fn load_extractor(config: &Config) -> Result<Extractor> {
    let detector = FaceDetector::load(&config.detector_model_path()).context("could not load the face detector")?;
    let recognizer =
        FaceRecognizer::load(&config.recognizer_model_path()).context("could not load the face recognizer")?;
    Ok(EmbeddingExtractor::new(detector, recognizer))
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.db_path).with_context(|| format!("could not open database {}", config.db_path.display()))
}

fn format_report(date: NaiveDate, rows: &[AttendanceRow]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Id", "Name", "Status"]);
    for row in rows {
        table.add_row(vec![row.student_id.as_str(), row.name.as_str(), row.status.as_str()]);
    }
    let present = rows.iter().filter(|r| r.present).count();
    format!("Attendance for {date}\n{table}\n{present}/{} present\n", rows.len())
}

fn format_students(students: &[StudentSummary]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Id", "Name"]);
    for s in students {
        table.add_row(vec![s.student_id.as_str(), s.name.as_str()]);
    }
    table.to_string()
}

fn report(store: &Store, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let (date, rows) = match date {
        Some(date) => (date, store.attendance_for_date(date)),
        None => (neuraface_store::today(), store.attendance_today()),
    };
    let rows = rows.context("could not read attendance")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No students registered");
    } else {
        print!("{}", format_report(date, &rows));
    }
    Ok(())
}

fn list_students(store: &Store) -> Result<()> {
    let students = store.students().context("could not list students")?;
    if students.is_empty() {
        println!("No students registered");
        return Ok(());
    }
    println!("{}", format_students(&students));
    Ok(())
}

/// Write a student's registered face crop to `out`.
fn export_student_image(store: &Store, student_id: &str, out: &Path) -> Result<()> {
    let png = store
        .student_image(student_id)
        .with_context(|| format!("could not read the image for student {student_id}"))?;
    std::fs::write(out, png).with_context(|| format!("could not write {}", out.display()))?;
    println!("Wrote {student_id}'s face image to {}", out.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(device) = cli.device {
        config.camera_device = device;
    }

    let mut store = open_store(&config)?;

    match cli.command {
        Commands::Register { id, name, image } => register::run(&config, &store, &id, &name, image.as_deref())?,
        Commands::Scan { snapshot } => scan::run(&config, &mut store, snapshot).await?,
        Commands::Report { date, json } => report(&store, date, json)?,
        Commands::Students { image: Some(id), out: Some(out) } => export_student_image(&store, &id, &out)?,
        Commands::Students { .. } => list_students(&store)?,
    }

    Ok(())
}
