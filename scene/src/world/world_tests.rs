use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use cgmath::{Point3, Vector3};

use super::*;
use crate::common::Transform;
use crate::geometry::{Geometry, Representation};
use crate::id::encode_rgb_id;
use crate::instance::Viewable;
use crate::mesh::{positions_from_points, Mesh};
use crate::mesh_data::{Lod, MeshData};
use crate::render::{RenderFlag, RenderMode, RenderSettings};
use crate::test_support::{RecordingBackend, TestGeometry};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn part(geometry: TestGeometry) -> Representation {
    Representation::from_geometry(geometry.boxed())
}

fn translation(x: f64, y: f64, z: f64) -> Transform {
    Transform::from_translation(Vector3::new(x, y, z))
}

/// World with one unit part placed at `offset` under the root.
fn world_with_part(offset: Transform) -> (World, OccurrenceId) {
    let world = World::new();
    let root = world.handle().root();
    let occurrence = world
        .handle_mut()
        .add_part(root, "part", part(TestGeometry::unit()), offset)
        .unwrap();
    (world, occurrence)
}

fn square_mesh() -> Mesh {
    let mut data = MeshData::new();
    data.positions = positions_from_points(&[
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ]);
    data.add_lod(Lod::new(0.0, vec![0, 1, 2, 0, 2, 3]));
    Mesh::new(data)
}

// ===== Handle lifetime =====

#[test]
fn test_new_world_has_only_root() {
    let world = World::new();
    let handle = world.handle();

    assert_eq!(handle.occurrence_count(), 1);
    assert_eq!(handle.reference_count(), 1);
    assert_eq!(handle.view_instance_count(), 0);
    assert!(handle.children(handle.root()).is_empty());
    assert!(handle.bounding_box().is_empty());
}

#[test]
fn test_graph_dropped_with_last_handle() {
    let drops = Arc::new(AtomicUsize::new(0));
    let world = World::new();
    let root = world.handle().root();
    world
        .handle_mut()
        .add_part(
            root,
            "counted",
            part(TestGeometry::unit().counting_drops(drops.clone())),
            Transform::identity(),
        )
        .unwrap();

    let first = world.clone();
    let second = world.clone();
    assert_eq!(world.share_count(), 3);

    assert!(first.release());
    assert!(second.release());
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert_eq!(world.share_count(), 1);

    assert!(!world.release());
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_assign_shares_graph() {
    let first = World::new();
    let mut second = World::new();
    assert_ne!(first, second);

    second.assign(&first);
    assert_eq!(first, second);
    assert_eq!(first.share_count(), 2);

    // Assigning the graph already held changes nothing.
    let same = second.clone();
    second.assign(&same);
    assert_eq!(first.share_count(), 3);
}

#[test]
fn test_world_moves_across_threads() {
    let world = World::new();
    let shared = world.clone();

    let worker = thread::spawn(move || {
        let root = shared.handle().root();
        shared
            .handle_mut()
            .add_part(root, "remote", part(TestGeometry::unit()), Transform::identity())
            .unwrap();
    });
    worker.join().unwrap();

    assert_eq!(world.handle().view_instance_count(), 1);
}

// ===== Building the graph =====

#[test]
fn test_unknown_parent_is_rejected() {
    let world = World::new();
    let mut handle = world.handle_mut();

    let result = handle.add_assembly(9_999_999, "orphan", Transform::identity());
    assert!(result.is_err());
    assert_eq!(handle.occurrence_count(), 1);
}

#[test]
fn test_struct_instance_needs_known_reference() {
    let world = World::new();
    let mut handle = world.handle_mut();

    let result = handle.add_struct_instance(StructInstance::new(9_999_999, Transform::identity()));
    assert!(result.is_err());
}

#[test]
fn test_absolute_matrix_follows_parents() {
    let world = World::new();
    let mut handle = world.handle_mut();
    let root = handle.root();

    let assembly = handle
        .add_assembly(root, "frame", translation(10.0, 0.0, 0.0))
        .unwrap();
    let bolt = handle
        .add_part(assembly, "bolt", part(TestGeometry::unit()), translation(0.0, 5.0, 0.0))
        .unwrap();

    let view = handle.view_instance(bolt).unwrap();
    assert_eq!(view.matrix().translation(), Vector3::new(10.0, 5.0, 0.0));
    assert!(handle.view_instance(assembly).is_none());
    assert_eq!(handle.ancestors(bolt), vec![assembly, root]);

    let placement = handle.occurrence(assembly).unwrap().struct_instance();
    handle
        .set_relative_matrix(placement, translation(20.0, 0.0, 0.0))
        .unwrap();

    let moved = handle.occurrence(bolt).unwrap().absolute_matrix().translation();
    assert_eq!(moved, Vector3::new(20.0, 5.0, 0.0));
    let view = handle.view_instance(bolt).unwrap();
    assert_eq!(view.matrix().translation(), Vector3::new(20.0, 5.0, 0.0));
    assert_eq!(view.bounding_box().min(), Point3::new(20.0, 5.0, 0.0));
}

#[test]
fn test_instance_of_shares_bodies() {
    let (world, first) = world_with_part(Transform::identity());
    let mut handle = world.handle_mut();
    let root = handle.root();

    let placement = handle.occurrence(first).unwrap().struct_instance();
    let reference = handle.struct_instance(placement).unwrap().reference();
    let second = handle
        .add_instance_of(root, reference, translation(3.0, 0.0, 0.0))
        .unwrap();

    let a = handle.view_instance(first).unwrap().representation().clone();
    let b = handle.view_instance(second).unwrap().representation();
    assert!(a.shares_bodies_with(b));
    assert_eq!(handle.reference_count(), 2);
    assert_eq!(handle.struct_instance_count(), 3);
}

// ===== Removal =====

#[test]
fn test_root_cannot_be_removed() {
    let world = World::new();
    let mut handle = world.handle_mut();
    let root = handle.root();

    assert!(handle.remove_occurrence(root).is_err());
    assert!(handle.remove_occurrence(9_999_999).is_err());
}

#[test]
fn test_remove_subtree_drops_unused_definitions() {
    init_logger();
    let world = World::new();
    let mut handle = world.handle_mut();
    let root = handle.root();

    let assembly = handle
        .add_assembly(root, "frame", Transform::identity())
        .unwrap();
    let kept = handle
        .add_part(assembly, "bolt", part(TestGeometry::unit()), Transform::identity())
        .unwrap();
    handle
        .add_part(assembly, "nut", part(TestGeometry::unit()), Transform::identity())
        .unwrap();

    // A second placement of the bolt outside the removed subtree.
    let placement = handle.occurrence(kept).unwrap().struct_instance();
    let bolt = handle.struct_instance(placement).unwrap().reference();
    let outside = handle
        .add_instance_of(root, bolt, Transform::identity())
        .unwrap();
    handle.select(kept);

    handle.remove_occurrence(assembly).unwrap();

    assert_eq!(handle.occurrence_count(), 2);
    assert_eq!(handle.children(root), &[outside]);
    assert_eq!(handle.view_instance_count(), 1);
    // root and bolt survive, frame and nut are gone
    assert_eq!(handle.reference_count(), 2);
    assert!(handle.reference(bolt).is_some());
    assert_eq!(handle.struct_instance_count(), 2);
    assert!(handle.selection().is_empty());
}

// ===== Merge =====

#[test]
fn test_merge_into_itself_fails() {
    let world = World::new();
    let alias = world.clone();
    assert!(world.merge(&alias).is_err());
}

#[test]
fn test_merge_copies_children_and_shares_bodies() {
    init_logger();
    let (source, source_part) = world_with_part(translation(1.0, 2.0, 3.0));
    {
        let mut handle = source.handle_mut();
        let view = handle.view_instance_mut(source_part).unwrap();
        view.set_order_weight(7);
        view.set_visible(false);
    }

    let target = World::new();
    let added = target.merge(&source).unwrap();
    assert_eq!(added.len(), 1);

    let handle = target.handle();
    let merged = added[0];
    assert_ne!(merged, source_part);
    assert_eq!(handle.children(handle.root()), &[merged]);
    assert_eq!(handle.reference_count(), 2);

    let view = handle.view_instance(merged).unwrap();
    assert_eq!(view.matrix().translation(), Vector3::new(1.0, 2.0, 3.0));
    assert_eq!(view.order_weight(), 7);
    assert!(!view.is_visible());

    let source_handle = source.handle();
    let original = source_handle.view_instance(source_part).unwrap();
    assert!(view.representation().shares_bodies_with(original.representation()));

    // The source is left untouched.
    assert_eq!(source_handle.occurrence_count(), 2);
}

#[test]
fn test_merge_empty_world_copies_its_root() {
    let source = World::new();
    let target = World::new();

    let added = target.merge(&source).unwrap();

    assert_eq!(added.len(), 1);
    let handle = target.handle();
    assert_eq!(handle.occurrence_count(), 2);
    assert_eq!(handle.view_instance_count(), 0);
    assert_eq!(handle.occurrence(added[0]).unwrap().parent(), Some(handle.root()));
}

#[test]
fn test_merge_keeps_nested_placement() {
    let source = World::new();
    {
        let mut handle = source.handle_mut();
        let root = handle.root();
        let assembly = handle
            .add_assembly(root, "frame", translation(5.0, 0.0, 0.0))
            .unwrap();
        handle
            .add_part(assembly, "bolt", part(TestGeometry::unit()), translation(0.0, 1.0, 0.0))
            .unwrap();
    }

    let target = World::new();
    let added = target.merge(&source).unwrap();

    let handle = target.handle();
    let assembly = added[0];
    let bolt = handle.children(assembly)[0];
    let view = handle.view_instance(bolt).unwrap();
    assert_eq!(view.matrix().translation(), Vector3::new(5.0, 1.0, 0.0));
}

#[test]
fn test_merged_bodies_stay_shared_with_source() {
    let (source, _) = world_with_part(Transform::identity());
    assert_eq!(source.bounding_box().max(), Point3::new(1.0, 1.0, 1.0));

    let target = World::new();
    target.merge(&source).unwrap();
    target.set_unit_factor(10.0);

    // Vertices are shared, placements are not.
    assert_eq!(source.bounding_box().max(), Point3::new(10.0, 10.0, 10.0));
    assert_eq!(target.bounding_box().max(), Point3::new(10.0, 10.0, 10.0));
}

#[test]
fn test_opposite_merges_from_two_threads() {
    let first = World::new();
    let second = World::new();
    let (a, b) = (first.clone(), second.clone());

    let forward = thread::spawn(move || {
        for _ in 0..6 {
            a.merge(&b).unwrap();
        }
    });
    for _ in 0..6 {
        second.merge(&first).unwrap();
    }
    forward.join().unwrap();

    assert!(first.handle().occurrence_count() > 6);
    assert!(second.handle().occurrence_count() > 6);
}

// ===== Unit factor =====

#[test]
fn test_unit_factor_scales_translation_only() {
    let placement = translation(1.0, 2.0, 3.0) * Transform::from_scale(2.0, 1.0, 1.0);
    let (world, occurrence) = world_with_part(placement);

    world.set_unit_factor(10.0);

    let handle = world.handle();
    let relative = {
        let instance = handle.occurrence(occurrence).unwrap().struct_instance();
        *handle.struct_instance(instance).unwrap().relative_matrix()
    };
    assert_eq!(relative.translation(), Vector3::new(10.0, 20.0, 30.0));
    assert!((relative.scaling_x() - 2.0).abs() < 1e-12);
    assert!((relative.scaling_y() - 1.0).abs() < 1e-12);
    let view = handle.view_instance(occurrence).unwrap();
    assert_eq!(view.matrix().translation(), Vector3::new(10.0, 20.0, 30.0));
}

#[test]
fn test_unit_factor_transforms_shared_bodies_once() {
    let (world, first) = world_with_part(Transform::identity());
    {
        let mut handle = world.handle_mut();
        let root = handle.root();
        let placement = handle.occurrence(first).unwrap().struct_instance();
        let reference = handle.struct_instance(placement).unwrap().reference();
        handle
            .add_instance_of(root, reference, Transform::identity())
            .unwrap();
    }

    world.set_unit_factor(10.0);

    let handle = world.handle();
    let bounds = handle
        .view_instance(first)
        .unwrap()
        .representation()
        .bounding_box();
    assert_eq!(bounds.max(), Point3::new(10.0, 10.0, 10.0));
    assert_eq!(world_bounds_max(&handle), Point3::new(10.0, 10.0, 10.0));
}

fn world_bounds_max(handle: &WorldHandle) -> Point3<f64> {
    handle.bounding_box().max()
}

// ===== Selection =====

fn three_parts() -> (World, [OccurrenceId; 3]) {
    let world = World::new();
    let mut handle = world.handle_mut();
    let root = handle.root();
    let mut ids = [0; 3];
    for (i, id) in ids.iter_mut().enumerate() {
        *id = handle
            .add_part(
                root,
                "part",
                part(TestGeometry::unit()),
                translation(i as f64 * 2.0, 0.0, 0.0),
            )
            .unwrap();
    }
    drop(handle);
    (world, ids)
}

#[test]
fn test_selection_modes() {
    let (world, [a, b, c]) = three_parts();

    world.update_selection(
        &SelectionEvent::new(SelectionModes::REPLACE)
            .with_occurrence(a)
            .with_occurrence(b),
    );
    assert_eq!(world.handle().selection().occurrences(), &[a, b]);
    assert!(world.handle().view_instance(a).unwrap().is_selected());

    let toggle = SelectionModes::ADD | SelectionModes::REMOVE;
    world.update_selection(&SelectionEvent::new(toggle).with_occurrence(a).with_occurrence(c));
    assert_eq!(world.handle().selection().occurrences(), &[b, c]);
    assert!(!world.handle().view_instance(a).unwrap().is_selected());

    world.update_selection(&SelectionEvent::new(SelectionModes::REMOVE).with_occurrence(b));
    assert_eq!(world.handle().selection().occurrences(), &[c]);

    world.update_selection(&SelectionEvent::new(SelectionModes::ADD).with_bodies(a, vec![42]));
    let handle = world.handle();
    assert_eq!(handle.selection().occurrences(), &[c, a]);
    assert_eq!(handle.selection().bodies(a), &[42]);
}

#[test]
fn test_replace_with_empty_event_clears() {
    let (world, [a, _, _]) = three_parts();
    world.handle_mut().select(a);

    world.update_selection(&SelectionEvent::new(SelectionModes::REPLACE));

    let handle = world.handle();
    assert!(handle.selection().is_empty());
    assert!(!handle.view_instance(a).unwrap().is_selected());
}

#[test]
fn test_selection_skips_unknown_occurrences() {
    init_logger();
    let (world, [a, _, _]) = three_parts();

    world.update_selection(
        &SelectionEvent::new(SelectionModes::ADD)
            .with_occurrence(9_999_999)
            .with_occurrence(a),
    );

    assert_eq!(world.handle().selection().occurrences(), &[a]);
    assert!(!world.handle_mut().select(9_999_999));
}

#[test]
fn test_minimum_selected_drops_covered_descendants() {
    let world = World::new();
    let (assembly, bolt, lone) = {
        let mut handle = world.handle_mut();
        let root = handle.root();
        let assembly = handle
            .add_assembly(root, "frame", Transform::identity())
            .unwrap();
        let bolt = handle
            .add_part(assembly, "bolt", part(TestGeometry::unit()), Transform::identity())
            .unwrap();
        let lone = handle
            .add_part(root, "lone", part(TestGeometry::unit()), Transform::identity())
            .unwrap();
        (assembly, bolt, lone)
    };

    world.update_selection(
        &SelectionEvent::new(SelectionModes::ADD)
            .with_occurrence(bolt)
            .with_occurrence(lone)
            .with_occurrence(assembly),
    );

    assert_eq!(world.minimum_selected_occurrences(), vec![lone, assembly]);

    world.handle_mut().unselect(assembly);
    assert_eq!(world.minimum_selected_occurrences(), vec![bolt, lone]);

    world.handle_mut().unselect_all();
    assert!(world.minimum_selected_occurrences().is_empty());
    assert!(!world.handle().view_instance(bolt).unwrap().is_selected());
}

// ===== Sharp edges and clearing =====

#[test]
fn test_sharp_edges_drawn_in_wire_pass() {
    let world = World::new();
    let root = world.handle().root();
    world
        .handle_mut()
        .add_part(
            root,
            "plate",
            Representation::from_geometry(Box::new(square_mesh())),
            Transform::identity(),
        )
        .unwrap();

    world.create_sharp_edges(1e-6, 30.0);

    let mut backend = RecordingBackend::new();
    world.render(RenderFlag::Wire, false, None, &RenderSettings::default(), &mut backend);

    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    // four border edges, the diagonal is flat
    assert_eq!(draws[0].element_count, 8);
    assert_eq!(draws[0].flag, RenderFlag::Wire);
}

#[test]
fn test_clear_releases_only_unshared_bodies() {
    init_logger();
    let owned = Arc::new(AtomicUsize::new(0));
    let shared = Arc::new(AtomicUsize::new(0));
    let outside = part(TestGeometry::unit().counting_releases(shared.clone()));

    let world = World::new();
    let old_root = world.handle().root();
    {
        let mut handle = world.handle_mut();
        handle
            .add_part(
                old_root,
                "owned",
                part(TestGeometry::unit().counting_releases(owned.clone())),
                Transform::identity(),
            )
            .unwrap();
        handle
            .add_part(old_root, "shared", outside.clone(), Transform::identity())
            .unwrap();
        handle.select(old_root);
    }

    world.clear();

    assert_eq!(owned.load(Ordering::SeqCst), 1);
    assert_eq!(shared.load(Ordering::SeqCst), 0);
    assert_eq!(outside.share_count(), 1);

    let handle = world.handle();
    assert_ne!(handle.root(), old_root);
    assert_eq!(handle.occurrence_count(), 1);
    assert_eq!(handle.reference_count(), 1);
    assert_eq!(handle.view_instance_count(), 0);
    assert!(handle.selection().is_empty());
}

// ===== Rendering =====

#[test]
fn test_render_follows_draw_order_and_skips_hidden() {
    let world = World::new();
    let root = world.handle().root();
    let mut bodies = Vec::new();
    {
        let mut handle = world.handle_mut();
        for weight in [2, 0, 1, 3, 4] {
            let geometry = TestGeometry::unit();
            bodies.push(geometry.id());
            let occurrence = handle
                .add_part(root, "part", part(geometry), Transform::identity())
                .unwrap();
            let view = handle.view_instance_mut(occurrence).unwrap();
            view.set_order_weight(weight);
            match weight {
                3 => view.set_visible(false),
                4 => view.set_viewable(Viewable::NotViewable),
                _ => {}
            }
        }
    }

    let mut backend = RecordingBackend::new();
    world.render(
        RenderFlag::Shading,
        false,
        None,
        &RenderSettings::default(),
        &mut backend,
    );

    let drawn: Vec<_> = backend.draws().iter().map(|call| call.geometry).collect();
    assert_eq!(drawn, vec![bodies[1], bodies[2], bodies[0]]);
}

#[test]
fn test_body_selection_render_uses_body_ids() {
    let (world, _) = three_parts();
    let settings = RenderSettings {
        selection_mode: true,
        pixel_culling: false,
    };

    let mut backend = RecordingBackend::new();
    world.render_for_body_selection(&settings, &mut backend);

    let draws = backend.draws();
    assert_eq!(draws.len(), 3);
    assert!(draws.iter().all(|call| call.mode == RenderMode::BodySelection));
    let expected: Vec<_> = draws.iter().map(|call| encode_rgb_id(call.geometry)).collect();
    assert_eq!(backend.color_ids(), expected);
}

#[test]
#[should_panic(expected = "body selection render outside selection mode")]
fn test_body_selection_render_requires_selection_mode() {
    let (world, _) = three_parts();
    let mut backend = RecordingBackend::new();
    world.render_for_body_selection(&RenderSettings::default(), &mut backend);
}

#[test]
fn test_bounding_box_covers_visible_instances() {
    let (world, [_, _, c]) = three_parts();
    assert_eq!(world.bounding_box().max(), Point3::new(5.0, 1.0, 1.0));

    world
        .handle_mut()
        .view_instance_mut(c)
        .unwrap()
        .set_visible(false);

    let bounds = world.bounding_box();
    assert_eq!(bounds.min(), Point3::new(0.0, 0.0, 0.0));
    assert_eq!(bounds.max(), Point3::new(3.0, 1.0, 1.0));
}
