//! `neuraface scan`: the timer-driven capture loop around a recognition session.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use neuraface_core::{
    encode_png, BgrImage, EmbeddingExtractor, EmbeddingIndex, EuclideanMatcher, FaceDetect, FaceEmbed, Overlay,
    RecognitionSession, SessionError, SessionState, ARCFACE_EMBEDDING_DIM,
};
use neuraface_hw::{device_path_for_index, CameraError, CameraSlot};
use neuraface_store::Store;
use std::future::Future;
use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Give up after this many capture failures in a row.
const MAX_CAPTURE_FAILURES: u32 = 100;
/// Typed lines waiting to be handled.
const INPUT_QUEUE: usize = 8;

const LOCKED_PROMPT: &str = "[y] accept / [r] recapture / [c N] switch camera / [q] quit";
const ACCEPTED_PROMPT: &str = "[r] next student / [c N] switch camera / [q] quit";
const AMBIGUOUS_WARNING: &str = "More than one registered student in view; scan one student at a time";

/// A line typed at the scan prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptCommand {
    Accept,
    Recapture,
    SwitchCamera(u32),
    Quit,
}

impl FromStr for PromptCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let cmd = match words.next().map(str::to_ascii_lowercase).as_deref() {
            Some("y") | Some("yes") => PromptCommand::Accept,
            Some("r") => PromptCommand::Recapture,
            Some("q") | Some("quit") => PromptCommand::Quit,
            Some("c") => {
                let index = words
                    .next()
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| "usage: c N (camera index)".to_string())?;
                PromptCommand::SwitchCamera(index)
            }
            _ => return Err(format!("unknown command {:?}; {LOCKED_PROMPT}", s.trim())),
        };
        if words.next().is_some() {
            return Err(format!("unexpected input {:?}", s.trim()));
        }
        Ok(cmd)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Stored embeddings must come from the same model that embeds live faces.
fn check_index_dimension(index: &EmbeddingIndex, expected: usize) -> Result<()> {
    if index.dimension() != expected {
        bail!(
            "stored embeddings do not match the model: the database holds {}-dim embeddings, \
             the recognizer produces {expected}-dim ones; re-register the students",
            index.dimension()
        );
    }
    Ok(())
}

/// Read stdin lines on a plain thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(INPUT_QUEUE);
    std::thread::Builder::new()
        .name("neuraface-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            tracing::debug!("stdin reader exiting");
        })
        .context("could not start the input reader")?;
    Ok(rx)
}

struct Scanner<D, E> {
    camera: CameraSlot,
    extractor: EmbeddingExtractor<D, E>,
    session: RecognitionSession,
    overlay: Overlay,
    warmup_frames: usize,
    snapshot: Option<PathBuf>,
    capture_failures: u32,
    ambiguous: bool,
}

impl<D: FaceDetect, E: FaceEmbed> Scanner<D, E> {
    fn wants_frames(&self) -> bool {
        self.session.is_capturing() && self.camera.is_open()
    }

    /// Pull one frame and run it through the session.
    fn tick(&mut self) -> Result<()> {
        let frame = match self.camera.capture_frame() {
            Ok(frame) => {
                self.capture_failures = 0;
                frame
            }
            Err(CameraError::NotOpen) => return Ok(()),
            Err(e) => {
                self.capture_failures += 1;
                tracing::warn!(error = %e, failures = self.capture_failures, "frame capture failed");
                if self.capture_failures >= MAX_CAPTURE_FAILURES {
                    bail!("camera stopped delivering frames: {e}");
                }
                return Ok(());
            }
        };
        tracing::trace!(sequence = frame.sequence, "frame captured");

        for line in self.observe(frame.image)? {
            println!("{line}");
        }
        Ok(())
    }

    /// Recognise one frame; returns the lines to show the user.
    fn observe(&mut self, image: BgrImage) -> Result<Vec<String>> {
        let report = self.session.process_frame(&image, &mut self.extractor)?;
        let mut out = Vec::new();

        if report.is_ambiguous() && !self.ambiguous {
            out.push(AMBIGUOUS_WARNING.to_string());
        }
        self.ambiguous = report.is_ambiguous();

        if let SessionState::Locked(who) = self.session.state() {
            out.push(format!("Recognised {} ({}), distance {:.3}", who.name, who.student_id, who.distance));
            if let Some(path) = &self.snapshot {
                let png = encode_png(&self.overlay.render(&image, &report.detections))
                    .context("could not encode snapshot")?;
                std::fs::write(path, png).with_context(|| format!("could not write snapshot {}", path.display()))?;
                tracing::debug!(path = %path.display(), "snapshot written");
            }
            out.push(LOCKED_PROMPT.to_string());
        }
        Ok(out)
    }

    fn handle(&mut self, cmd: PromptCommand, store: &mut Store) -> Result<Flow> {
        match cmd {
            PromptCommand::Quit => return Ok(Flow::Quit),
            PromptCommand::Accept => match self.session.confirm(store) {
                Ok(who) => {
                    println!("Attendance recorded for {} ({})", who.name, who.student_id);
                    println!("{ACCEPTED_PROMPT}");
                }
                Err(SessionError::InvalidTransition { .. }) => println!("No student is locked yet"),
                Err(e @ SessionError::Ledger(_)) => {
                    tracing::error!(error = %e, "attendance write failed");
                    println!("{e}; press y to retry or r to recapture");
                }
                Err(e) => return Err(e.into()),
            },
            PromptCommand::Recapture => {
                self.session.recapture();
                self.ambiguous = false;
                println!("Scanning...");
            }
            PromptCommand::SwitchCamera(index) => {
                let device = device_path_for_index(index);
                match self.camera.switch(&device) {
                    Ok(()) => {
                        self.camera.discard_frames(self.warmup_frames);
                        println!("Switched to {device}");
                    }
                    Err(e) => println!("Camera {index} is not available ({e}); pick another with c N"),
                }
                self.session.recapture();
                self.ambiguous = false;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Run the loop until `stop` resolves, the user quits, or input closes.
async fn drive<D, E, S>(
    scanner: &mut Scanner<D, E>,
    store: &mut Store,
    input: &mut mpsc::Receiver<String>,
    tick: Duration,
    stop: S,
) -> Result<()>
where
    D: FaceDetect,
    E: FaceEmbed,
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => {
                tracing::info!("interrupted");
                return Ok(());
            }
            _ = ticker.tick(), if scanner.wants_frames() => scanner.tick()?,
            line = input.recv() => {
                let Some(line) = line else {
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<PromptCommand>() {
                    Ok(cmd) => {
                        if scanner.handle(cmd, store)? == Flow::Quit {
                            return Ok(());
                        }
                    }
                    Err(msg) => println!("{msg}"),
                }
            }
        }
    }
}

pub async fn run(config: &Config, store: &mut Store, snapshot: Option<PathBuf>) -> Result<()> {
    let index = store.load_all_students().context("could not load registered students")?;
    if !index.is_empty() {
        check_index_dimension(&index, ARCFACE_EMBEDDING_DIM)?;
    }
    let matcher = EuclideanMatcher::new(config.distance_threshold);
    let session = match RecognitionSession::start(index, matcher) {
        Err(SessionError::EmptyIndex) => {
            bail!("no students registered; register at least one student with `neuraface register` first")
        }
        other => other?,
    };

    let overlay = match (&snapshot, &config.font_path) {
        (None, _) => Overlay::without_labels(),
        (Some(_), Some(font)) => Overlay::with_font_file(font).context("could not load the label font")?,
        (Some(_), None) => Overlay::with_system_font(),
    };

    let extractor = crate::load_extractor(config)?;
    let mut camera = CameraSlot::open(&config.camera_device, config.mirror)
        .with_context(|| format!("could not open camera {}", config.camera_device))?;
    camera.discard_frames(config.warmup_frames);

    let mut scanner = Scanner {
        camera,
        extractor,
        session,
        overlay,
        warmup_frames: config.warmup_frames,
        snapshot,
        capture_failures: 0,
        ambiguous: false,
    };

    let mut input = spawn_stdin_reader()?;
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    println!("Scanning... (Ctrl-C to stop)");
    let result = drive(&mut scanner, store, &mut input, Duration::from_millis(config.tick_ms), ctrl_c).await;

    scanner.camera.release();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuraface_core::detector::DetectorError;
    use neuraface_core::recognizer::RecognizerError;
    use neuraface_core::{BoundingBox, Embedding};

    /// Reports the same boxes for every frame.
    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetect for FixedDetector {
        fn detect(&mut self, _image: &BgrImage) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    /// Embeds a crop as its top-left RGB pixel.
    struct PixelEmbedder;

    impl FaceEmbed for PixelEmbedder {
        fn embed(&mut self, face_rgb: &image::RgbImage) -> Result<Embedding, RecognizerError> {
            Ok(Embedding::new(face_rgb.get_pixel(0, 0).0.iter().map(|&c| c as f32).collect()))
        }
    }

    fn bbox(x: f32) -> BoundingBox {
        BoundingBox { x, y: 0.0, width: 5.0, height: 5.0, confidence: 0.9 }
    }

    /// Left half is Alice's colour, right half Bob's.
    fn frame() -> BgrImage {
        let mut data = Vec::new();
        for _ in 0..10 {
            for x in 0..20 {
                let px: [u8; 3] = if x < 10 { [30, 20, 10] } else { [3, 2, 1] };
                data.extend_from_slice(&px);
            }
        }
        BgrImage::new(data, 20, 10).unwrap()
    }

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::from_rows(vec![
            ("s1".to_string(), "Alice".to_string(), Embedding::new(vec![10.0, 20.0, 30.0])),
            ("s2".to_string(), "Bob".to_string(), Embedding::new(vec![1.0, 2.0, 3.0])),
        ])
        .unwrap()
    }

    fn scanner(boxes: Vec<BoundingBox>) -> Scanner<FixedDetector, PixelEmbedder> {
        Scanner {
            camera: CameraSlot::new(false),
            extractor: EmbeddingExtractor::new(FixedDetector(boxes), PixelEmbedder),
            session: RecognitionSession::start(index(), EuclideanMatcher::new(1.0)).unwrap(),
            overlay: Overlay::without_labels(),
            warmup_frames: 0,
            snapshot: None,
            capture_failures: 0,
            ambiguous: false,
        }
    }

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.save_student("s1", "Alice", b"png", &Embedding::new(vec![10.0, 20.0, 30.0])).unwrap();
        store
    }

    #[test]
    fn test_prompt_commands() {
        assert_eq!("y".parse::<PromptCommand>(), Ok(PromptCommand::Accept));
        assert_eq!(" R ".parse::<PromptCommand>(), Ok(PromptCommand::Recapture));
        assert_eq!("q".parse::<PromptCommand>(), Ok(PromptCommand::Quit));
        assert_eq!("c 2".parse::<PromptCommand>(), Ok(PromptCommand::SwitchCamera(2)));
    }

    #[test]
    fn test_prompt_rejects_bad_input() {
        assert!("c".parse::<PromptCommand>().is_err());
        assert!("c two".parse::<PromptCommand>().is_err());
        assert!("y now".parse::<PromptCommand>().is_err());
        let err = "x".parse::<PromptCommand>().unwrap_err();
        assert!(err.contains("[y] accept"));
    }

    #[test]
    fn test_ambiguous_warning_only_when_it_starts() {
        let mut s = scanner(vec![bbox(0.0), bbox(12.0)]);
        assert_eq!(s.observe(frame()).unwrap(), vec![AMBIGUOUS_WARNING.to_string()]);
        assert!(s.observe(frame()).unwrap().is_empty());
        assert!(s.session.is_capturing());
    }

    #[test]
    fn test_single_student_locks_and_prompts() {
        let mut s = scanner(vec![bbox(0.0)]);
        let lines = s.observe(frame()).unwrap();
        assert!(lines[0].starts_with("Recognised Alice (s1)"));
        assert_eq!(lines.last().map(String::as_str), Some(LOCKED_PROMPT));
    }

    #[test]
    fn test_accept_writes_today_and_quit_stops() {
        let mut s = scanner(vec![bbox(0.0)]);
        let mut store = store();
        s.observe(frame()).unwrap();

        assert_eq!(s.handle(PromptCommand::Accept, &mut store).unwrap(), Flow::Continue);
        assert!(store.attendance_today().unwrap()[0].present);
        assert!(matches!(s.session.state(), SessionState::Accepted(_)));
        assert_eq!(s.handle(PromptCommand::Quit, &mut store).unwrap(), Flow::Quit);
    }

    #[test]
    fn test_index_dimension_must_match_model() {
        assert!(check_index_dimension(&index(), 3).is_ok());
        let err = check_index_dimension(&index(), ARCFACE_EMBEDDING_DIM).unwrap_err();
        assert!(err.to_string().starts_with("stored embeddings do not match the model"));
    }

    #[tokio::test]
    async fn test_stop_ends_loop_while_input_is_idle() {
        let mut s = scanner(vec![]);
        let mut store = store();
        let (_tx, mut rx) = mpsc::channel::<String>(INPUT_QUEUE);

        let stop = tokio::time::sleep(Duration::from_millis(20));
        let run = drive(&mut s, &mut store, &mut rx, Duration::from_millis(1), stop);
        let finished = tokio::time::timeout(Duration::from_secs(5), run).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_quit_and_closed_input_end_loop() {
        let mut s = scanner(vec![]);
        let mut store = store();

        let (tx, mut rx) = mpsc::channel::<String>(INPUT_QUEUE);
        tx.send("bogus".into()).await.unwrap();
        tx.send("q".into()).await.unwrap();
        let run = drive(&mut s, &mut store, &mut rx, Duration::from_millis(1), std::future::pending());
        assert!(tokio::time::timeout(Duration::from_secs(5), run).await.is_ok());

        drop(tx);
        let run = drive(&mut s, &mut store, &mut rx, Duration::from_millis(1), std::future::pending());
        assert!(tokio::time::timeout(Duration::from_secs(5), run).await.is_ok());
    }
}
