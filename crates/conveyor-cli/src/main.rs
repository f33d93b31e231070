//! End-to-end wiring example: register simulated processors for every task
//! type, start the service, submit a mixed batch, poll results, print stats,
//! shut down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conveyor_core::{
    DispatchTable, HandlerError, MemoryStore, Processor, QueueConfig, QueueService, TaskId,
    TaskType,
};

/// Stands in for a real capability: checks its required payload field,
/// simulates a little work, and echoes a result.
struct SimulatedProcessor {
    name: &'static str,
    required_field: &'static str,
    work: Duration,
}

#[async_trait]
impl Processor for SimulatedProcessor {
    async fn process(
        &self,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError> {
        let value = payload
            .get(self.required_field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerError::new(format!("{} is required", self.required_field)))?;

        sleep(self.work).await;

        let mut result = serde_json::Map::new();
        result.insert("processed_by".to_string(), self.name.into());
        result.insert(self.required_field.to_string(), value.into());
        Ok(serde_json::Value::Object(result))
    }
}

fn build_dispatch() -> Result<DispatchTable, conveyor_core::Error> {
    let mut dispatch = DispatchTable::new();
    for (task_type, name, required_field) in [
        (TaskType::StepDetection, "step-detector", "screenshot_url"),
        (TaskType::OcrExtraction, "ocr", "image_url"),
        (TaskType::ContentGeneration, "content-generator", "prompt"),
        (TaskType::VoiceSynthesis, "voice-synthesizer", "text"),
        (TaskType::ImageAnalysis, "image-analyzer", "image_url"),
    ] {
        dispatch.register(
            task_type,
            Arc::new(SimulatedProcessor {
                name,
                required_field,
                work: Duration::from_millis(150),
            }),
        )?;
    }
    Ok(dispatch)
}

async fn poll_result(service: &QueueService, task_id: TaskId) {
    loop {
        match service.get_result(task_id).await {
            Ok(Some(record)) if record.status.is_terminal() => {
                info!(
                    task_id = %task_id,
                    status = ?record.status,
                    result = ?record.result,
                    error = ?record.error,
                    processing_time = ?record.processing_time,
                    "task finished"
                );
                return;
            }
            Ok(_) => sleep(Duration::from_millis(50)).await,
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "status query failed");
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_core=debug,conveyor_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = QueueConfig::from_env();
    let store = Arc::new(MemoryStore::new(config.status_ttl));
    let service = QueueService::new(store, build_dispatch()?, config);

    service.start().await?;

    // A mixed batch: different types and priorities, plus one payload that
    // the OCR processor will reject.
    let submissions = [
        (
            TaskType::ContentGeneration,
            serde_json::json!({"prompt": "summarize the release notes"}),
            3,
        ),
        (
            TaskType::OcrExtraction,
            serde_json::json!({"image_url": "https://example.com/receipt.png"}),
            9,
        ),
        (
            TaskType::VoiceSynthesis,
            serde_json::json!({"text": "your build is green"}),
            5,
        ),
        (
            // Missing image_url: ends FAILED with the processor's message.
            TaskType::OcrExtraction,
            serde_json::json!({"languages": ["en"]}),
            5,
        ),
    ];

    let mut task_ids = Vec::new();
    for (task_type, payload, priority) in submissions {
        let task_id = service.submit(task_type, payload, priority).await?;
        task_ids.push(task_id);
    }

    for task_id in &task_ids {
        poll_result(&service, *task_id).await;
    }

    let stats = service.queue_stats().await?;
    info!(
        pending = stats.total_pending(),
        total_workers = stats.total_workers,
        active_workers = stats.active_workers,
        "final queue stats"
    );

    service.stop().await?;
    Ok(())
}
