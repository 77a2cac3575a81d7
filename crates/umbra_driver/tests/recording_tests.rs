//! Integration tests for the recording driver

use umbra_driver::*;

#[test]
fn test_surface_lifecycle() {
    let mut driver = RecordingDriver::new();
    let desc = SurfaceDesc::square(256, SurfaceFormat::Depth32Float, SurfaceUsage::DepthMap);

    let a = driver.create_surface(&desc).unwrap();
    let b = driver.create_surface(&desc).unwrap();
    assert_ne!(a, b);
    assert!(a.is_valid());
    assert_eq!(driver.live_surface_count(), 2);
    assert_eq!(driver.live_bytes(), 2 * desc.byte_size());

    driver.destroy_surface(a).unwrap();
    assert_eq!(driver.live_surface_count(), 1);
    assert_eq!(driver.destroy_surface(a), Err(DriverError::UnknownSurface(a.0)));

    let stats = driver.stats();
    assert_eq!(stats.surfaces_created, 2);
    assert_eq!(stats.surfaces_destroyed, 1);
}

#[test]
fn test_unsupported_format_rejected() {
    let mut driver = RecordingDriver::new().without_format(SurfaceFormat::Rg16Float);
    assert!(!driver.supports_format(SurfaceFormat::Rg16Float));
    assert!(driver.supports_format(SurfaceFormat::Rg32Float));

    let desc = SurfaceDesc::square(64, SurfaceFormat::Rg16Float, SurfaceUsage::StatisticsMap);
    assert!(matches!(
        driver.create_surface(&desc),
        Err(DriverError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_injected_submission_failures() {
    let mut driver = RecordingDriver::new();
    let target = driver
        .create_surface(&SurfaceDesc::square(64, SurfaceFormat::Rgba8Unorm, SurfaceUsage::RenderTarget))
        .unwrap();

    driver.fail_next_submissions(1);
    let sub = DrawSubmission::new(PassKind::PostProcess).with_target(target);
    assert!(driver.submit(&sub).is_err());
    assert!(driver.submit(&sub).is_ok());
    assert_eq!(driver.submissions().len(), 1);
    assert_eq!(driver.stats().failed_submissions, 1);
}

#[test]
fn test_submission_to_unknown_target_fails() {
    let mut driver = RecordingDriver::new();
    let sub = DrawSubmission::new(PassKind::Copy).with_target(SurfaceHandle(99));
    assert_eq!(driver.submit(&sub), Err(DriverError::UnknownSurface(99)));
}

#[test]
fn test_constants_keep_last_upload() {
    let mut driver = RecordingDriver::new();
    driver.upload_constants(ConstantSlot::Grid, &[1, 2, 3]).unwrap();
    driver.upload_constants(ConstantSlot::Grid, &[4, 5]).unwrap();
    assert_eq!(driver.constants(ConstantSlot::Grid), Some(&[4u8, 5][..]));
    assert_eq!(driver.constants(ConstantSlot::Lights), None);
    assert_eq!(driver.stats().constant_uploads, 2);
}

#[test]
fn test_states_are_recorded_in_order() {
    let mut driver = RecordingDriver::new();
    let a = driver.create_state(&StateDesc::Blend(BlendStateDesc::additive())).unwrap();
    let b = driver
        .create_state(&StateDesc::DepthStencil(DepthStencilStateDesc::disabled()))
        .unwrap();
    assert_ne!(a, b);
    assert_eq!(driver.created_states().len(), 2);
}
