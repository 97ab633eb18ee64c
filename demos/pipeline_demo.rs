//! 照片摄取流水线演示程序
//!
//! 展示核心序列：登记患者 → 上传照片 → 请求分类 → 写回文档，
//! 以及分类失败时文档保持不变的行为

use anemia_core::{AnemiaError, Gender, NewPatient, Result};
use anemia_database::{MemoryDocumentStore, PatientRepository};
use anemia_integration::{Classification, Classifier};
use anemia_storage::ObjectBlobStore;
use anemia_workflow::{
    BlockingSignal, CancelToken, NotificationQueue, PhotoIngestionPipeline, SelectedPhoto,
    UploadSession,
};
use async_trait::async_trait;
use object_store::memory::InMemory;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 演示用分类端点替身，可切换为失败模式
struct DemoClassifier {
    fail: AtomicBool,
}

#[async_trait]
impl Classifier for DemoClassifier {
    async fn classify(&self, image_url: &str) -> Result<Classification> {
        println!("   🔬 分类请求: {}", image_url);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AnemiaError::Classification(
                "endpoint returned 500 Internal Server Error".to_string(),
            ));
        }
        Ok(Classification {
            clase: "anémico".to_string(),
            confianza: 92.5,
            message: "ok".to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 贫血筛查照片摄取流水线演示\n");

    // 1. 组装各层：内存对象存储、内存文档库、分类替身
    let objects = Arc::new(InMemory::new());
    let blobs = Arc::new(ObjectBlobStore::new(objects, "http://localhost:8080/blobs"));
    let documents = Arc::new(MemoryDocumentStore::new());
    let repository = Arc::new(PatientRepository::new(documents, blobs.clone()));
    let classifier = Arc::new(DemoClassifier {
        fail: AtomicBool::new(false),
    });
    let blocking = Arc::new(BlockingSignal::new());
    let notifications = Arc::new(NotificationQueue::new());
    let pipeline = PhotoIngestionPipeline::new(
        repository.clone(),
        blobs,
        classifier.clone(),
        blocking,
        notifications.clone(),
    );
    println!("✅ 各层组装完成");

    // 2. 登记患者
    let patient_id = repository
        .create(NewPatient {
            nombres: "María José".to_string(),
            apellidos: "Quispe Ñahui".to_string(),
            edad: 34,
            genero: Gender::Femenino,
        })
        .await?;
    println!("✅ 患者已登记: {}", patient_id);

    // 3. 订阅进度并执行一次完整的摄取运行
    let mut progress = pipeline.subscribe_progress();
    let session = UploadSession {
        patient_id: Some(patient_id.clone()),
        photo: Some(SelectedPhoto {
            filename: "conjuntiva.jpg".to_string(),
            bytes: vec![0x7f; 600 * 1024],
        }),
    };
    let outcome = pipeline.run(&session, &CancelToken::new()).await?;
    println!("📤 上传进度终值: {}%", *progress.borrow_and_update());
    println!("📋 运行终态: {:?}", outcome);
    if let Some(notification) = notifications.take() {
        println!("🔔 通知: {}", notification.message);
    }

    let patient = repository.get_one(&patient_id).await?;
    println!("\n📊 患者文档:");
    println!("   姓名: {}", patient.full_name());
    println!("   照片: {}", patient.image_url.as_deref().unwrap_or("-"));
    if let Some(prediction) = &patient.prediction_result {
        println!(
            "   预测: {} (置信度 {:.1})",
            prediction.clase, prediction.confianza
        );
    }

    // 4. 分类失败时文档保持不变
    println!("\n💥 切换分类端点为失败模式后再次上传");
    classifier.fail.store(true, Ordering::SeqCst);
    let second = repository
        .create(NewPatient {
            nombres: "Juan".to_string(),
            apellidos: "Pérez".to_string(),
            edad: 8,
            genero: Gender::Masculino,
        })
        .await?;
    let session = UploadSession {
        patient_id: Some(second.clone()),
        photo: Some(SelectedPhoto {
            filename: "conjuntiva.jpg".to_string(),
            bytes: vec![0x11; 128 * 1024],
        }),
    };
    let outcome = pipeline.run(&session, &CancelToken::new()).await?;
    println!("📋 运行终态: {:?}", outcome);
    let patient = repository.get_one(&second).await?;
    println!(
        "   文档未被修改: imageUrl={:?}, predictionResult={:?}",
        patient.image_url, patient.prediction_result
    );

    println!("\n🎉 演示完成");
    Ok(())
}
