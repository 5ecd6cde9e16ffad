//! Local, deterministic patch application.
//!
//! The first three ladder rungs resolve without any external call; this
//! module implements them as pure artifact-to-artifact transforms, plus
//! the rung-4 fallback template that always verifies and compiles.

use regex::Regex;

use crate::domain::artifact::{Artifact, ContentSpec};
use crate::domain::timeline::{
    BoundingBox, ElementPlacement, Interval, Region, SceneState, Shot, TimelineModel,
};
use crate::layout::LayoutConfig;

use super::ladder::{RepairAction, API_SUBSTITUTIONS};

/// Apply a local repair action. Returns `None` for actions that need an
/// external call (scoped regeneration) or cannot change the artifact.
pub fn apply_local(
    action: &RepairAction,
    artifact: &Artifact,
    spec: &ContentSpec,
    layout: &LayoutConfig,
) -> Option<Artifact> {
    match action {
        RepairAction::ParameterFix {
            parameter,
            replacement,
        } => apply_parameter_fix(artifact, parameter, replacement.as_deref()),
        RepairAction::ApiSubstitution => apply_api_substitutions(artifact),
        RepairAction::SimplifyObject { element_id } => simplify(artifact, element_id.as_deref()),
        RepairAction::FallbackTemplate => {
            Some(fallback_artifact(spec, layout, artifact.version + 1))
        }
        RepairAction::ScopedRegeneration { .. } => None,
    }
}

/// Rename or strip a known-bad parameter in every call site.
fn apply_parameter_fix(
    artifact: &Artifact,
    parameter: &str,
    replacement: Option<&str>,
) -> Option<Artifact> {
    let source = match replacement {
        Some(new_name) => {
            let pattern = Regex::new(&format!(r"\b{}\s*=", regex::escape(parameter))).ok()?;
            pattern
                .replace_all(&artifact.source, format!("{new_name}="))
                .into_owned()
        }
        None => {
            let pattern =
                Regex::new(&format!(r"\b{}\s*=\s*[^,)\n]+,?\s*", regex::escape(parameter)))
                    .ok()?;
            let stripped = pattern.replace_all(&artifact.source, "").into_owned();
            cleanup_argument_lists(&stripped)
        }
    };

    if source == artifact.source {
        return None;
    }
    Some(artifact.patched(artifact.timeline.next_version(), source))
}

/// Sweep the static deprecated-call mapping over the source.
fn apply_api_substitutions(artifact: &Artifact) -> Option<Artifact> {
    let mut source = artifact.source.clone();
    for (deprecated, current) in API_SUBSTITUTIONS {
        source = source.replace(deprecated, current);
    }

    if source == artifact.source {
        return None;
    }
    Some(artifact.patched(artifact.timeline.next_version(), source))
}

/// Remove the offending element (or the lowest-priority one) from the
/// timeline and every source line that names it.
fn simplify(artifact: &Artifact, element_id: Option<&str>) -> Option<Artifact> {
    let target = match element_id {
        Some(id) => id.to_string(),
        None => artifact
            .timeline
            .placements()
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.element_id.cmp(&a.element_id))
            })?
            .element_id
            .clone(),
    };

    let mut timeline = artifact.timeline.next_version();
    let before: usize = timeline.shots.iter().map(|s| s.elements.len()).sum();
    for shot in &mut timeline.shots {
        shot.elements.retain(|e| e.element_id != target);
    }
    let after: usize = timeline.shots.iter().map(|s| s.elements.len()).sum();
    if after == before {
        return None;
    }

    let source: String = artifact
        .source
        .lines()
        .filter(|line| !line.contains(&target))
        .collect::<Vec<_>>()
        .join("\n");

    Some(artifact.patched(timeline, source))
}

/// Tidy argument lists after a parameter removal.
fn cleanup_argument_lists(source: &str) -> String {
    let double_comma = Regex::new(r",\s*,").unwrap();
    let trailing = Regex::new(r",\s*\)").unwrap();
    let leading = Regex::new(r"\(\s*,").unwrap();

    let source = double_comma.replace_all(source, ",");
    let source = trailing.replace_all(&source, ")");
    leading.replace_all(&source, "(").into_owned()
}

/// The known-good minimal template: one shot, one title element well
/// inside the center region. It passes layout safety for any sane config
/// and its source contains nothing a compiler can reject, guaranteeing
/// pipeline termination.
pub fn fallback_artifact(spec: &ContentSpec, layout: &LayoutConfig, version: u32) -> Artifact {
    let duration = spec.duration_seconds.max(1.0);
    let center = layout.region_bounds(Region::Center);
    let bbox = BoundingBox::new(
        center.x + center.width * 0.15,
        center.y + center.height * 0.15,
        center.width * 0.7,
        center.height * 0.7,
    );

    let timeline = TimelineModel {
        version,
        total_duration: duration,
        shots: vec![Shot {
            id: "fallback".to_string(),
            start_time: 0.0,
            end_time: duration,
            scene_state: SceneState::Clean,
            elements: vec![ElementPlacement {
                element_id: "title".to_string(),
                region: Region::Center,
                bounding_box: bbox,
                visible_interval: Interval::new(0.0, duration),
                priority: 10,
            }],
        }],
    };

    let source = format!(
        "from manim import *\n\n\
         class FallbackScene(Scene):\n    \
             def construct(self):\n        \
                 title = Text(\"{}\", font_size=48)\n        \
                 self.play(FadeIn(title))\n        \
                 self.wait({:.1})\n        \
                 self.play(FadeOut(title))\n",
        spec.topic.replace('"', "'"),
        (duration - 2.0).max(0.5),
    );

    Artifact::new(version, timeline, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::verify;

    fn artifact_with_source(source: &str) -> Artifact {
        Artifact::new(1, TimelineModel::new(10.0, vec![]), source.to_string())
    }

    fn spec() -> ContentSpec {
        ContentSpec {
            topic: "Pythagorean theorem".to_string(),
            audience: "general".to_string(),
            duration_seconds: 30.0,
            source_content: None,
        }
    }

    #[test]
    fn test_parameter_rename() {
        let artifact = artifact_with_source("title = Text(\"hi\", size=48)");
        let patched = apply_parameter_fix(&artifact, "size", Some("font_size")).unwrap();

        assert!(patched.source.contains("font_size=48"));
        assert!(!patched.source.contains(" size="));
        assert_eq!(patched.version, 2);
    }

    #[test]
    fn test_parameter_removal_keeps_call_well_formed() {
        let artifact = artifact_with_source("c = Circle(radius=1.0, stroke_width_factor=2, color=RED)");
        let patched = apply_parameter_fix(&artifact, "stroke_width_factor", None).unwrap();

        assert!(!patched.source.contains("stroke_width_factor"));
        assert!(!patched.source.contains(",,"));
        assert!(!patched.source.contains(", )"));
        assert!(patched.source.contains("color=RED)"));
    }

    #[test]
    fn test_api_substitution_sweep() {
        let artifact =
            artifact_with_source("self.play(ShowCreation(circle))\nax.get_graph(func)");
        let patched = apply_api_substitutions(&artifact).unwrap();

        assert!(patched.source.contains("Create(circle)"));
        assert!(patched.source.contains("ax.plot(func)"));
        assert!(!patched.source.contains("ShowCreation"));
    }

    #[test]
    fn test_substitution_on_clean_source_is_noop() {
        let artifact = artifact_with_source("self.play(Create(circle))");
        assert!(apply_api_substitutions(&artifact).is_none());
    }

    #[test]
    fn test_fallback_template_passes_verification() {
        let layout = LayoutConfig::default();
        let artifact = fallback_artifact(&spec(), &layout, 3);

        assert_eq!(artifact.version, 3);
        assert!(verify(&artifact.timeline, &layout).is_empty());
        assert!(artifact
            .timeline
            .validate(layout.max_coverage_gap)
            .is_ok());
        assert!(artifact.source.contains("Pythagorean"));
    }

    #[test]
    fn test_simplify_removes_named_element() {
        let mut timeline = TimelineModel::new(10.0, vec![]);
        timeline.shots.push(Shot {
            id: "s1".into(),
            start_time: 0.0,
            end_time: 10.0,
            scene_state: SceneState::Clean,
            elements: vec![
                ElementPlacement {
                    element_id: "keep".into(),
                    region: Region::Top,
                    bounding_box: BoundingBox::new(-1.0, 1.5, 2.0, 1.0),
                    visible_interval: Interval::new(0.0, 10.0),
                    priority: 5,
                },
                ElementPlacement {
                    element_id: "extra".into(),
                    region: Region::Center,
                    bounding_box: BoundingBox::new(-1.0, -0.5, 2.0, 1.0),
                    visible_interval: Interval::new(0.0, 10.0),
                    priority: 0,
                },
            ],
        });
        let artifact = Artifact::new(1, timeline, "draw(keep)\ndraw(extra)".to_string());

        let patched = simplify(&artifact, Some("extra")).unwrap();
        assert!(patched.timeline.find_element("extra").is_none());
        assert!(patched.timeline.find_element("keep").is_some());
        assert!(!patched.source.contains("extra"));
    }
}
