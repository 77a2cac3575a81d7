//! Run a few lighting frames against the recording driver and print what
//! happened.
//!
//! ```text
//! RUST_LOG=debug cargo run -p umbra_lighting --example headless_frames
//! ```

use glam::Vec3;
use umbra_driver::RecordingDriver;
use umbra_lighting::prelude::*;
use umbra_lighting::{GroundPlane, ShadowSettingsLod};

fn main() {
    env_logger::init();

    let mut config = LightingConfig::default().with_indirect(true);
    config.shadow_settings.entries.insert(
        "rsm".to_string(),
        umbra_lighting::generate_shadow_settings(ShadowMethodFlags::RSM),
    );
    config.pool.budget_bytes = 32 * 1024 * 1024;

    let mut lighting = LightingContext::new(config);
    let mut driver = RecordingDriver::new();

    lighting.add_light(
        Light::spot("key", Vec3::new(0.0, 4.0, -5.0), Vec3::NEG_Y, 12.0, 0.7)
            .with_indirect_lods(vec![ShadowSettingsLod::new(0, "rsm")]),
    );
    lighting.add_light(Light::point("fill", Vec3::new(3.0, 2.0, -8.0), 6.0));
    lighting.add_light(Light::directional("sun", Vec3::new(-0.3, -1.0, -0.2)));

    let scene = GroundPlane::default();
    let mut camera = CameraView::look_at(Vec3::new(0.0, 2.0, 4.0), Vec3::new(0.0, 1.0, -5.0), 1.0, 16.0 / 9.0, 0.1, 300.0);

    for frame in 0..8 {
        let report = lighting.update(1.0 / 60.0, &FrameInputs::new(&camera, &scene), &mut driver);
        println!(
            "frame {}: generated {} cached {} exhausted {} indirect units {}",
            report.frame,
            report.generated.len(),
            report.cached.len(),
            report.exhausted.len(),
            report.indirect.as_ref().map_or(0, |d| d.units),
        );
        if frame == 3 {
            lighting.events().send(LightingEvent::SetDetailLevels { shadow: 1, indirect: 0 });
        }
        camera = CameraView::look_at(
            camera.position + Vec3::new(0.5, 0.0, -0.5),
            Vec3::new(0.0, 1.0, -5.0),
            1.0,
            16.0 / 9.0,
            0.1,
            300.0,
        );
    }

    let pool = lighting.pool().stats();
    println!(
        "pool: {} entries, {} leased, {} bytes; driver: {} live surfaces",
        pool.entries,
        pool.leased,
        pool.used_bytes,
        driver.live_surface_count()
    );
    println!("grid: {:?}", lighting.grid().stats());
    println!("states: {:?}", lighting.state_cache().stats());

    if let Err(err) = lighting.shutdown(&mut driver) {
        eprintln!("shutdown failed: {}", err);
    }
}
