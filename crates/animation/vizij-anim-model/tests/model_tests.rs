use std::sync::Arc;

use glam::{Quat, Vec3};
use parking_lot::Mutex;
use vizij_anim_model::{
    parse_skeleton_json, CurveId, CurveKind, DataModel, FrameRate, Interpolation, ModelError,
    ModelEvent, ModelNotification, PoseSource, RichCurveKey, Skeleton, TrackKeys, TransformCurve,
};

fn biped() -> Arc<Skeleton> {
    let json = vizij_test_fixtures::skeletons::json("biped").expect("load biped fixture");
    Arc::new(parse_skeleton_json(&json).expect("parse biped skeleton"))
}

fn model_30fps_1s() -> DataModel {
    DataModel::new("test", biped(), FrameRate::new(30.0).unwrap(), 1.0).unwrap()
}

fn ramp_keys(n: usize) -> TrackKeys {
    TrackKeys {
        positions: (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
        rotations: vec![Quat::IDENTITY],
        scales: vec![Vec3::ONE],
    }
}

fn content_changes(events: &[ModelEvent]) -> Vec<&vizij_anim_model::ChangeSet> {
    events
        .iter()
        .filter_map(|e| match e {
            ModelEvent::ContentChanged(cs) => Some(cs),
            _ => None,
        })
        .collect()
}

#[test]
fn resize_inside_bracket_is_visible_only_after_close() {
    let mut model = model_30fps_1s();
    assert_eq!(model.num_keys(), 31);

    let mut ctrl = model.controller();
    ctrl.open_bracket("lengthen");
    ctrl.resize_play_length(2.0).unwrap();
    assert_eq!(ctrl.model().num_keys(), 31);
    ctrl.close_bracket().unwrap();

    assert_eq!(model.num_keys(), 61);
    assert!((model.play_length() - 2.0).abs() < 1e-9);
}

#[test]
fn nested_brackets_coalesce_into_one_change_set() {
    let mut model = model_30fps_1s();
    {
        let mut ctrl = model.controller();
        ctrl.open_bracket("outer");
        ctrl.open_bracket("inner");
        ctrl.add_bone_track("pelvis").unwrap();
        ctrl.set_bone_track_keys("pelvis", ramp_keys(31)).unwrap();
        ctrl.close_bracket().unwrap();
        assert!(content_changes(ctrl.model().events()).is_empty());
        ctrl.close_bracket().unwrap();
    }
    let events = model.drain_events();
    let changes = content_changes(&events);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].notifications.len(), 2);
    assert!(changes[0].requires_rebuild);
    assert_eq!(model.content_generation(), 1);

    let opened = events
        .iter()
        .filter(|e| matches!(e, ModelEvent::BracketOpened { .. }))
        .count();
    let closed = events
        .iter()
        .filter(|e| matches!(e, ModelEvent::BracketClosed))
        .count();
    assert_eq!((opened, closed), (1, 1));
}

#[test]
fn edits_outside_brackets_flush_individually() {
    let mut model = model_30fps_1s();
    let mut ctrl = model.controller();
    ctrl.add_bone_track("pelvis").unwrap();
    ctrl.add_bone_track("spine").unwrap();
    let events = model.drain_events();
    assert_eq!(content_changes(&events).len(), 2);
    assert_eq!(model.content_generation(), 2);
    assert_eq!(model.tracks().len(), 2);
}

#[test]
fn rejected_edits_leave_model_untouched() {
    let mut model = model_30fps_1s();
    model.controller().add_bone_track("pelvis").unwrap();
    model.drain_events();
    let before = model.track("pelvis").cloned().unwrap();

    let mut ctrl = model.controller();
    let err = ctrl.set_bone_track_keys("pelvis", ramp_keys(30)).unwrap_err();
    assert!(matches!(
        err,
        ModelError::KeyCountMismatch {
            expected: 31,
            got: 30,
            ..
        }
    ));
    assert!(matches!(
        ctrl.add_bone_track("tail"),
        Err(ModelError::UnknownBone { .. })
    ));
    assert!(matches!(
        ctrl.add_bone_track("pelvis"),
        Err(ModelError::DuplicateTrack { .. })
    ));
    assert!(matches!(
        ctrl.resize_play_length(-1.0),
        Err(ModelError::InvalidPlayLength { .. })
    ));
    assert!(matches!(
        ctrl.set_frame_rate(0.0),
        Err(ModelError::InvalidFrameRate { .. })
    ));
    assert!(matches!(
        ctrl.scale_curve(CurveId(99), 0.0, 2.0),
        Err(ModelError::CurveNotFound { .. })
    ));

    assert_eq!(model.track("pelvis"), Some(&before));
    assert_eq!(model.num_keys(), 31);
    assert!(model.drain_events().is_empty());
    assert_eq!(model.content_generation(), 1);
}

#[test]
fn track_keys_validate_against_pending_key_count() {
    let mut model = model_30fps_1s();
    let mut ctrl = model.controller();
    ctrl.add_bone_track("pelvis").unwrap();
    ctrl.open_bracket("resize then key");
    ctrl.resize_number_of_keys(61).unwrap();
    assert!(ctrl.set_bone_track_keys("pelvis", ramp_keys(31)).is_err());
    ctrl.set_bone_track_keys("pelvis", ramp_keys(61)).unwrap();
    ctrl.close_bracket().unwrap();
    assert_eq!(model.num_keys(), 61);
    assert_eq!(model.track("pelvis").unwrap().keys.positions.len(), 61);
}

#[test]
fn close_without_open_is_an_error() {
    let mut model = model_30fps_1s();
    assert_eq!(
        model.controller().close_bracket(),
        Err(ModelError::BracketNotOpen)
    );
}

#[test]
fn curve_ids_come_from_the_skeleton_registry() {
    let mut model = model_30fps_1s();
    let skeleton = model.skeleton().clone();
    let mut ctrl = model.controller();

    let blink = ctrl.add_curve("blink", CurveKind::Float).unwrap();
    assert_eq!(Some(blink), skeleton.find_curve("blink"));
    ctrl.remove_curve(blink).unwrap();
    assert_eq!(ctrl.add_curve("blink", CurveKind::Float).unwrap(), blink);

    let smile = ctrl.rename_curve(blink, "smile").unwrap();
    assert_eq!(Some(smile), skeleton.find_curve("smile"));
    assert_ne!(smile, blink);
    assert!(model.curve(blink).is_none());
    assert_eq!(model.curve(smile).map(|c| c.name.as_str()), Some("smile"));
}

#[test]
fn duplicate_curve_names_are_rejected() {
    let mut model = model_30fps_1s();
    let mut ctrl = model.controller();
    let blink = ctrl.add_curve("blink", CurveKind::Float).unwrap();
    ctrl.add_curve("frown", CurveKind::Float).unwrap();
    assert!(matches!(
        ctrl.add_curve("blink", CurveKind::Float),
        Err(ModelError::DuplicateCurve { .. })
    ));
    assert!(matches!(
        ctrl.rename_curve(blink, "frown"),
        Err(ModelError::DuplicateCurve { .. })
    ));
    assert!(matches!(
        ctrl.set_transform_curve_keys(blink, TransformCurve::default()),
        Err(ModelError::WrongCurveKind { .. })
    ));
}

#[test]
fn color_changes_do_not_require_a_rebuild() {
    let mut model = model_30fps_1s();
    let id = model.controller().add_curve("blink", CurveKind::Float).unwrap();
    let generation = model.content_generation();
    model.drain_events();

    model
        .controller()
        .set_curve_color(id, [1.0, 0.0, 0.0, 1.0])
        .unwrap();
    let events = model.drain_events();
    let changes = content_changes(&events);
    assert_eq!(changes.len(), 1);
    assert!(!changes[0].requires_rebuild);
    assert_eq!(model.content_generation(), generation);
    assert_eq!(model.curve(id).unwrap().color, [1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn frame_rate_change_resamples_animated_components() {
    let mut model = model_30fps_1s();
    let mut ctrl = model.controller();
    ctrl.add_bone_track("pelvis").unwrap();
    ctrl.set_bone_track_keys("pelvis", ramp_keys(31)).unwrap();
    ctrl.set_frame_rate(15.0).unwrap();

    assert_eq!(model.num_keys(), 16);
    assert_eq!(model.frame_rate().as_f64(), 15.0);
    let keys = &model.track("pelvis").unwrap().keys;
    assert_eq!(keys.positions.len(), 16);
    assert_eq!(keys.positions[15].x, 30.0);
    assert_eq!(keys.rotations.len(), 1);

    let events = model.drain_events();
    let last = content_changes(&events).pop().cloned().unwrap();
    assert!(last
        .notifications
        .iter()
        .any(|n| matches!(n, ModelNotification::NumKeysChanged { old_num_keys: 31, new_num_keys: 16 })));
}

#[test]
fn shrinking_drops_curve_keys_past_the_end() {
    let mut model = model_30fps_1s();
    let mut ctrl = model.controller();
    let id = ctrl.add_curve("blink", CurveKind::Float).unwrap();
    ctrl.set_curve_keys(
        id,
        vec![
            RichCurveKey::linear(0.0, 0.0),
            RichCurveKey::linear(0.4, 1.0),
            RichCurveKey::linear(0.9, 0.0),
        ],
    )
    .unwrap();
    ctrl.resize_play_length(0.5).unwrap();
    assert_eq!(model.num_keys(), 16);
    assert_eq!(model.curve(id).unwrap().as_float().unwrap().keys.len(), 2);
}

#[test]
fn scale_curve_rescales_key_times() {
    let mut model = model_30fps_1s();
    let mut ctrl = model.controller();
    let id = ctrl.add_curve("blink", CurveKind::Float).unwrap();
    ctrl.set_curve_keys(
        id,
        vec![RichCurveKey::linear(0.2, 0.0), RichCurveKey::linear(0.6, 1.0)],
    )
    .unwrap();
    ctrl.scale_curve(id, 0.2, 0.5).unwrap();
    assert!(matches!(
        ctrl.scale_curve(id, 0.0, 0.0),
        Err(ModelError::InvalidScaleFactor { .. })
    ));
    let keys = &model.curve(id).unwrap().as_float().unwrap().keys;
    assert!((keys[0].time - 0.2).abs() < 1e-6);
    assert!((keys[1].time - 0.4).abs() < 1e-6);
}

#[test]
fn subscribers_see_events_in_emission_order() {
    let mut model = model_30fps_1s();
    let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = model.subscribe(move |event| {
        sink.lock().push(match event {
            ModelEvent::BracketOpened { .. } => "opened",
            ModelEvent::Notify(_) => "notify",
            ModelEvent::BracketClosed => "closed",
            ModelEvent::ContentChanged(_) => "changed",
            _ => "other",
        });
    });
    model.controller().add_bone_track("head").unwrap();
    assert_eq!(*seen.lock(), vec!["opened", "notify", "closed", "changed"]);

    assert!(model.unsubscribe(sub));
    model.controller().remove_bone_track("head").unwrap();
    assert_eq!(seen.lock().len(), 4);
}

#[test]
fn local_pose_layers_transform_curves_over_tracks() {
    let mut model = model_30fps_1s();
    let mut ctrl = model.controller();
    ctrl.add_bone_track("pelvis").unwrap();
    ctrl.set_bone_track_keys("pelvis", ramp_keys(31)).unwrap();
    let head = ctrl.add_curve("head", CurveKind::Transform).unwrap();
    let mut tc = TransformCurve::default();
    tc.translation[1].keys = vec![RichCurveKey::linear(0.0, 1.0)];
    ctrl.set_transform_curve_keys(head, tc).unwrap();

    let pose = model.evaluate_local_pose(0.5, Interpolation::Linear);
    assert_eq!(pose.len(), model.skeleton().num_bones());
    // pelvis sampled at key 15
    assert!((pose[1].translation.x - 15.0).abs() < 1e-4);
    // head: ref pose (0, 0.5, 0) offset by the curve's +1 on y
    assert!((pose[3].translation.y - 1.5).abs() < 1e-5);
    // spine has no track and holds its reference pose
    assert!((pose[2].translation.y - 0.3).abs() < 1e-6);
}

#[test]
fn remove_all_tracks_reports_count() {
    let mut model = model_30fps_1s();
    let mut ctrl = model.controller();
    ctrl.add_bone_track("pelvis").unwrap();
    ctrl.add_bone_track("spine").unwrap();
    ctrl.remove_all_bone_tracks().unwrap();
    assert!(model.tracks().is_empty());
    let events = model.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        ModelEvent::Notify(ModelNotification::AllTracksRemoved { count: 2 })
    )));
}
