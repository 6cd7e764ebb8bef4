use image::RgbImage;
use opentelemetry::global;
use opentelemetry_sdk::metrics::{
    InMemoryMetricExporter, PeriodicReader, SdkMeterProvider,
    data::{AggregatedMetrics, MetricData, ResourceMetrics},
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tiling::{
    Collaborators, DetectionService, GridConfig, MediaDirectory, MemoryBlobStore,
    MemoryDetectionStore, ModelHandle, RawDetection, SegmentationBackend, ServiceSettings,
    TaskQueue,
};

struct NothingFound;

impl SegmentationBackend for NothingFound {
    fn load_model(_path: &Path) -> anyhow::Result<Self> {
        Ok(NothingFound)
    }

    fn infer_tile(&self, _tile: &RgbImage) -> anyhow::Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}

/// Latest histogram count per `status` attribute.
fn duration_counts(exported: &[ResourceMetrics]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for resource in exported {
        for scope in resource.scope_metrics() {
            for metric in scope
                .metrics()
                .filter(|m| m.name() == "predict_duration_seconds")
            {
                if let AggregatedMetrics::F64(MetricData::Histogram(histogram)) = metric.data() {
                    for point in histogram.data_points() {
                        let status = point
                            .attributes()
                            .find(|kv| kv.key.as_str() == "status")
                            .map(|kv| kv.value.to_string())
                            .unwrap_or_default();
                        counts.insert(status, point.count());
                    }
                }
            }
        }
    }
    counts
}

#[tokio::test]
async fn test_failed_requests_are_timed_with_status() {
    let exporter = InMemoryMetricExporter::default();
    let provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter.clone()).build())
        .build();
    global::set_meter_provider(provider.clone());

    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("media");
    std::fs::create_dir_all(&media).unwrap();
    RgbImage::new(40, 10).save(media.join("scan.png")).unwrap();

    let tasks = TaskQueue::start(16);
    let service = DetectionService::new(
        ServiceSettings {
            grid: GridConfig::new(1, 4).unwrap(),
            work_dir: dir.path().join("work"),
            inference_timeout: Duration::from_secs(10),
            ..Default::default()
        },
        ModelHandle::new(NothingFound),
        Collaborators {
            images: Arc::new(MediaDirectory::new(&media)),
            records: Arc::new(MemoryDetectionStore::default()),
            blobs: Arc::new(MemoryBlobStore::new("reports", "http://blob.local")),
        },
        tasks.clone(),
    )
    .unwrap();

    assert!(service.predict(&["missing".to_string()]).await.is_err());
    assert!(service.predict(&["scan".to_string()]).await.is_ok());
    tasks.shutdown().await;

    provider.force_flush().unwrap();
    let counts = duration_counts(&exporter.get_finished_metrics().unwrap());

    assert_eq!(counts.get("error"), Some(&1));
    assert_eq!(counts.get("ok"), Some(&1));
}
