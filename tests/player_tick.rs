//! Integration coverage for the full player tick pipeline: frame source
//! -> overlay composite -> brightness/hue -> post-composite chains ->
//! Art-Net sampling -> preview publish, driven entirely through the
//! public `Engine` surface rather than any internal module.

use std::collections::BTreeMap;
use std::time::Duration;

use prismcast::config::{CanvasConfig, EngineConfig};
use prismcast::player::PlayerState;
use prismcast::{Engine, EngineSnapshot};

fn engine_with_canvas(width: u32, height: u32) -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = EngineConfig::default();
    config.canvas = CanvasConfig { width, height };
    Engine::new(config)
}

fn null_clip(engine: &Engine) -> uuid::Uuid {
    engine.register_clip(prismcast::frame_source::FrameSourceSpec::Null, None)
}

#[test]
fn a_loaded_clip_advances_frames_under_real_playback() {
    let engine = engine_with_canvas(8, 8);
    let clip_id = null_clip(&engine);
    engine.load_clip("video", clip_id).unwrap();
    engine.set_fps("video", 500).unwrap();

    engine.play("video").unwrap();
    std::thread::sleep(Duration::from_millis(60));
    let stats = engine.stats("video").unwrap();
    engine.stop("video").unwrap();

    assert_eq!(stats.state, PlayerState::Playing);
    assert!(stats.current_frame > 0, "play loop should have ticked at least once");
}

#[test]
fn generator_source_drives_the_pipeline_without_error_events() {
    let engine = engine_with_canvas(16, 16);
    let clip_id = engine.register_clip(
        prismcast::frame_source::FrameSourceSpec::Generator {
            plugin_id: "solid_color".to_string(),
            params: BTreeMap::new(),
        },
        None,
    );
    engine.load_clip("video", clip_id).unwrap();
    engine.set_fps("video", 200).unwrap();

    engine.play("video").unwrap();
    std::thread::sleep(Duration::from_millis(60));
    engine.stop("video").unwrap();

    let events = engine.drain_events();
    assert!(events.is_empty(), "unexpected runtime errors: {:?}", events);
}

#[test]
fn post_composite_chain_effect_survives_repeated_ticks() {
    let engine = engine_with_canvas(8, 8);
    let clip_id = null_clip(&engine);
    engine
        .add_chain_effect(clip_id, prismcast::clip::ChainTarget::Video, "invert".to_string(), BTreeMap::new())
        .unwrap();
    engine.load_clip("video", clip_id).unwrap();
    engine.set_fps("video", 300).unwrap();

    engine.play("video").unwrap();
    std::thread::sleep(Duration::from_millis(60));
    let stats = engine.stats("video").unwrap();
    engine.stop("video").unwrap();

    assert!(stats.current_frame > 0);
    assert!(engine.drain_events().is_empty());
}

#[test]
fn live_parameter_updates_take_effect_without_stopping_playback() {
    let engine = engine_with_canvas(8, 8);
    let clip_id = null_clip(&engine);
    engine.load_clip("video", clip_id).unwrap();
    engine.set_fps("video", 300).unwrap();
    engine.play("video").unwrap();

    engine.set_brightness("video", 50).unwrap();
    engine.set_hue_shift("video", 90).unwrap();
    std::thread::sleep(Duration::from_millis(40));

    let stats = engine.stats("video").unwrap();
    engine.stop("video").unwrap();

    assert_eq!(stats.state, PlayerState::Playing);
    assert!(stats.current_frame > 0);
}

#[test]
fn pause_halts_progress_and_resume_continues_it() {
    let engine = engine_with_canvas(8, 8);
    let clip_id = null_clip(&engine);
    engine.load_clip("video", clip_id).unwrap();
    engine.set_fps("video", 500).unwrap();
    engine.play("video").unwrap();

    std::thread::sleep(Duration::from_millis(30));
    engine.pause("video").unwrap();
    let paused_at = engine.stats("video").unwrap().current_frame;
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(engine.stats("video").unwrap().current_frame, paused_at);

    engine.resume("video").unwrap();
    std::thread::sleep(Duration::from_millis(30));
    let resumed_frame = engine.stats("video").unwrap().current_frame;
    engine.stop("video").unwrap();

    assert!(resumed_frame > paused_at, "resume should keep advancing frames");
}

#[test]
fn snapshot_and_restore_round_trips_a_live_playing_player() {
    let engine = engine_with_canvas(8, 8);
    let clip_id = null_clip(&engine);
    engine.load_clip("video", clip_id).unwrap();
    engine.set_brightness("video", 70).unwrap();
    engine.play("video").unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let snapshot: EngineSnapshot = engine.snapshot();
    engine.stop("video").unwrap();

    let restored = engine_with_canvas(8, 8);
    restored.restore(snapshot).unwrap();

    assert_eq!(restored.current_clip("video").unwrap(), Some(clip_id));
    assert_eq!(restored.status("video").unwrap(), PlayerState::Playing);
    restored.stop("video").unwrap();
}

#[test]
fn artnet_test_pattern_bypasses_the_play_loop_entirely() {
    let engine = engine_with_canvas(8, 8);
    let clip_id = null_clip(&engine);
    engine.load_clip("artnet", clip_id).unwrap();

    // No play() call: test_pattern must work against a stopped player.
    let result = engine.test_pattern("artnet", (255, 0, 0));
    assert!(result.is_ok());
}
