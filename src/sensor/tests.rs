use super::*;
use tokio::time::{Duration, timeout};

#[test]
fn test_events_are_routed_by_source() {
    assert!(SensorEvent::HeartRate(60).is_for(SensorSource::Internal));
    assert!(!SensorEvent::HeartRate(60).is_for(SensorSource::SensorBus));
    assert!(SensorEvent::Vario(1.0).is_for(SensorSource::SensorBus));
    assert!(SensorEvent::Vario(1.0).is_for(SensorSource::Any));
    let error = SensorEvent::Error(String::from("gone"));
    assert_eq!(error.source(), SensorSource::Any);
    assert!(error.is_for(SensorSource::Internal) && error.is_for(SensorSource::SensorBus));
}

#[tokio::test]
async fn test_subscription_skips_foreign_events() {
    let hub = SensorHub::new();
    let mut internal = hub.subscribe(SensorSource::Internal);
    let mut bus = hub.subscribe(SensorSource::SensorBus);
    assert_eq!(hub.subscriber_count(), 2);

    hub.publish(SensorEvent::Vario(1.5));
    hub.publish(SensorEvent::PressureAltitude(812.0));
    hub.publish(SensorEvent::StateChanged);

    assert_eq!(internal.recv().await, Some(SensorEvent::PressureAltitude(812.0)));
    assert_eq!(internal.recv().await, Some(SensorEvent::StateChanged));
    assert_eq!(bus.recv().await, Some(SensorEvent::Vario(1.5)));
    assert_eq!(bus.recv().await, Some(SensorEvent::StateChanged));
    assert!(timeout(Duration::from_millis(20), bus.recv()).await.is_err());

    drop(hub);
    assert_eq!(internal.recv().await, None);
}

#[tokio::test]
async fn test_lagging_subscriber_keeps_newest_events() {
    let hub = SensorHub::new();
    let mut sub = hub.subscribe(SensorSource::Internal);
    for bpm in 0..300 {
        hub.publish(SensorEvent::HeartRate(bpm));
    }
    let Some(SensorEvent::HeartRate(first)) = sub.recv().await else { panic!("expected a heart rate") };
    assert!(first >= 44);
    assert_eq!(hub.publish(SensorEvent::HeartRate(1)), 1);
}
