use crate::{
    aggregate::{AggregatedResult, DetectionAggregator},
    backend::ModelHandle,
    error::{Result, TilingError},
    grid::{GridConfig, GridPartitioner, Tile, TileGeometry, tile_file_name},
    remap::CoordinateRemapper,
    report::{ReportAssembler, TileArtifacts, remove_files},
    runner::{DEFAULT_INFERENCE_TIMEOUT, TileInferenceRunner},
    store::{
        BlobStore, DetectionRecord, DetectionStore, ImageRepository, generate_report_name,
        report_object_name,
    },
    tasks::TaskQueue,
    visualize::Visualizer,
};
use anyhow::Context;
use chrono::Utc;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::{
    collections::{BTreeMap, HashSet},
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub grid: GridConfig,
    /// Per-request temporary tiles and visualizations live under here.
    pub work_dir: PathBuf,
    pub allowed_types: Vec<String>,
    pub inference_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            work_dir: std::env::temp_dir().join("tiler"),
            allowed_types: vec!["png".to_string(), "jpeg".to_string()],
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }
}

/// Where images come from and where results go.
#[derive(Clone)]
pub struct Collaborators {
    pub images: Arc<dyn ImageRepository>,
    pub records: Arc<dyn DetectionStore>,
    pub blobs: Arc<dyn BlobStore>,
}

struct ServiceMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    tiles: Counter<u64>,
    detections: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> ServiceMetrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];
    ServiceMetrics {
        duration: meter
            .f64_histogram("predict_duration_seconds")
            .with_description("Time to answer one predict request (load + tile + infer + remap)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build(),
        requests: meter
            .u64_counter("predict_requests_total")
            .with_description("Predict requests, by outcome")
            .build(),
        tiles: meter
            .u64_counter("tiles_processed_total")
            .with_description("Tiles sent to the model")
            .build(),
        detections: meter
            .u64_counter("detections_total")
            .with_description("Detections returned to callers")
            .build(),
    }
}

/// Lower-cased extension with `jpg` folded into `jpeg`.
pub fn normalize_extension(extension: &str) -> String {
    let lower = extension.to_ascii_lowercase();
    if lower == "jpg" { "jpeg".to_string() } else { lower }
}

/// One source image on its way through the pipeline.
struct PreparedImage {
    file_id: String,
    stem: String,
    geometry: TileGeometry,
    tile_paths: Vec<PathBuf>,
    batch_range: Range<usize>,
}

/// Request-level orchestration: resolve, tile, infer once, remap, aggregate, then hand
/// persistence, report and cleanup to the task queue.
pub struct DetectionService {
    settings: ServiceSettings,
    partitioner: GridPartitioner,
    runner: TileInferenceRunner,
    aggregator: DetectionAggregator,
    visualizer: Visualizer,
    assembler: ReportAssembler,
    collaborators: Collaborators,
    tasks: TaskQueue,
    metrics: ServiceMetrics,
}

impl DetectionService {
    pub fn new(
        settings: ServiceSettings,
        model: ModelHandle,
        collaborators: Collaborators,
        tasks: TaskQueue,
    ) -> Result<Self> {
        let partitioner = GridPartitioner::new(settings.grid)?;
        let runner = TileInferenceRunner::new(model, settings.inference_timeout);

        Ok(Self {
            settings,
            partitioner,
            runner,
            aggregator: DetectionAggregator,
            visualizer: Visualizer::new(),
            assembler: ReportAssembler,
            collaborators,
            tasks,
            metrics: init_metrics("tiling"),
        })
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn model(&self) -> &ModelHandle {
        self.runner.model()
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    /// Results keyed by file id. Duplicate ids are processed once.
    #[tracing::instrument(skip(self), fields(files = file_ids.len()))]
    pub async fn predict(&self, file_ids: &[String]) -> Result<BTreeMap<String, AggregatedResult>> {
        let started = Instant::now();
        self.runner.ensure_available()?;

        let request_dir = self
            .settings
            .work_dir
            .join(format!("{:016x}", fastrand::u64(..)));

        let outcome = self.run_pipeline(file_ids, &request_dir).await;
        let status = [KeyValue::new(
            "status",
            if outcome.is_ok() { "ok" } else { "error" },
        )];
        self.metrics
            .duration
            .record(started.elapsed().as_secs_f64(), &status);
        self.metrics.requests.add(1, &status);

        match outcome {
            Ok(results) => {
                tracing::info!(
                    files = results.len(),
                    detections = results.values().map(|r| r.detected_count).sum::<usize>(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Prediction completed"
                );
                Ok(results)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Prediction failed, removing temporary files");
                if request_dir.exists() {
                    if let Err(cleanup) = std::fs::remove_dir_all(&request_dir) {
                        tracing::warn!(
                            path = %request_dir.display(),
                            error = %cleanup,
                            "Failed to remove request directory"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        file_ids: &[String],
        request_dir: &Path,
    ) -> Result<BTreeMap<String, AggregatedResult>> {
        let tiles_dir = request_dir.join("tiles");
        let visualizations_dir = request_dir.join("visualizations");

        let mut seen = HashSet::new();
        let mut prepared = Vec::new();
        let mut batch: Vec<Tile> = Vec::new();

        for file_id in file_ids {
            if !seen.insert(file_id.as_str()) {
                continue;
            }
            prepared.push(self.prepare(file_id, &tiles_dir, &mut batch)?);
        }

        // One model call for every tile of every file
        let results = self.runner.run(&batch).await?;
        self.metrics.tiles.add(batch.len() as u64, &[]);

        let mut outputs = BTreeMap::new();
        let mut jobs = Vec::with_capacity(prepared.len());

        for image in prepared {
            let range = image.batch_range.clone();
            let remapper = CoordinateRemapper::new(image.geometry);
            let result = self
                .aggregator
                .aggregate(remapper.remap_tiles(&results[range.clone()])?);
            let artifacts = self.visualizer.save_tiles(
                &visualizations_dir,
                &image.stem,
                &batch[range.clone()],
                &results[range],
            )?;

            self.metrics
                .detections
                .add(result.detected_count as u64, &[]);
            tracing::debug!(
                file_id = %image.file_id,
                detections = result.detected_count,
                "File processed"
            );

            outputs.insert(image.file_id.clone(), result.clone());
            jobs.push((image, result, artifacts));
        }

        // Nothing is handed off until every file succeeded
        for (image, result, artifacts) in jobs {
            self.enqueue_followups(image, result, artifacts);
        }
        let request_dir = request_dir.to_path_buf();
        self.tasks.submit("cleanup:request", move || {
            if request_dir.exists() {
                std::fs::remove_dir_all(&request_dir)
                    .with_context(|| format!("Failed to remove {}", request_dir.display()))?;
            }
            Ok(())
        });

        Ok(outputs)
    }

    /// Resolve, validate, load and partition one file; tiles are appended to `batch`
    /// and also written to `tiles_dir`.
    fn prepare(
        &self,
        file_id: &str,
        tiles_dir: &Path,
        batch: &mut Vec<Tile>,
    ) -> Result<PreparedImage> {
        let path = self.collaborators.images.resolve(file_id)?;
        let extension = self.check_allowed(&path)?;
        let image = image::open(&path)
            .map_err(|source| TilingError::InvalidImage {
                file_id: file_id.to_string(),
                source,
            })?
            .to_rgb8();
        let tile_set = self.partitioner.partition(&image)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_id.to_string());

        std::fs::create_dir_all(tiles_dir)?;
        let mut tile_paths = Vec::with_capacity(tile_set.len());
        for tile in &tile_set.tiles {
            let tile_path = tiles_dir.join(tile_file_name(&stem, tile.row, tile.col, &extension));
            tile.image.save(&tile_path)?;
            tile_paths.push(tile_path);
        }

        let start = batch.len();
        batch.extend(tile_set.tiles);

        Ok(PreparedImage {
            file_id: file_id.to_string(),
            stem,
            geometry: tile_set.geometry,
            tile_paths,
            batch_range: start..batch.len(),
        })
    }

    fn check_allowed(&self, path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .map(|ext| normalize_extension(&ext.to_string_lossy()))
            .unwrap_or_default();

        if self
            .settings
            .allowed_types
            .iter()
            .any(|allowed| normalize_extension(allowed) == extension)
        {
            Ok(extension)
        } else {
            Err(TilingError::UnsupportedFormat {
                extension,
                allowed: self.settings.allowed_types.join(", "),
            })
        }
    }

    /// Persist, then report, then cleanup. FIFO order keeps cleanup after the report read.
    fn enqueue_followups(
        &self,
        image: PreparedImage,
        result: AggregatedResult,
        artifacts: TileArtifacts,
    ) {
        let report_name = generate_report_name();
        let object = report_object_name(&report_name);
        let report_url = self.collaborators.blobs.public_url(&object);

        let record = DetectionRecord {
            file_id: image.file_id.clone(),
            result: result.clone(),
            report_name,
            report_url,
            created_at: Utc::now(),
        };
        let records = self.collaborators.records.clone();
        self.tasks
            .submit(format!("persist:{}", image.file_id), move || records.save(&record));

        let blobs = self.collaborators.blobs.clone();
        let assembler = self.assembler;
        let report_artifacts = artifacts.clone();
        self.tasks
            .submit(format!("report:{}", image.file_id), move || {
                let report = assembler.assemble_artifacts(&report_artifacts, &result)?;
                blobs.put(&object, &report.document)?;
                tracing::info!(object = %object, bytes = report.document.len(), "Report uploaded");
                Ok(())
            });

        let tile_paths = image.tile_paths;
        self.tasks
            .submit(format!("cleanup:{}", image.file_id), move || {
                let removed = artifacts.remove_all() + remove_files(&tile_paths);
                tracing::debug!(removed, "Temporary files removed");
                Ok(())
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("JPG"), "jpeg");
        assert_eq!(normalize_extension("jpeg"), "jpeg");
        assert_eq!(normalize_extension("PNG"), "png");
        assert_eq!(normalize_extension(""), "");
    }
}
