use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;
use worksite_risk::domain::{
    AuditEventDiff, DailyReportId, LibraryControl, LibraryControlId, LibraryHazard,
    LibraryHazardId, LibraryTaskId, Recommendation, RecommendationSubject, ReportHazardControl,
};
use worksite_risk::library::{
    ExpectedEntry, InMemoryLibrary, LibraryKind, LibraryReconciler, LibraryReferences,
    ReconcileManifest,
};

struct Catalog {
    library: Arc<InMemoryLibrary>,
    reconciler: LibraryReconciler,
    keep: LibraryHazardId,
    merged: LibraryHazardId,
    control: LibraryControlId,
    task: LibraryTaskId,
}

fn catalog() -> Catalog {
    let library = Arc::new(InMemoryLibrary::default());
    let keep = LibraryHazardId::new();
    let merged = LibraryHazardId::new();
    let control = LibraryControlId::new();
    for (id, name) in [(keep, "Struck by"), (merged, "Struck-by object")] {
        library.insert_hazard(LibraryHazard {
            id,
            name: name.to_string(),
            for_tasks: true,
            for_site_conditions: false,
            archived_at: None,
        });
    }
    library.insert_control(LibraryControl {
        id: control,
        name: "Barricades".to_string(),
        for_tasks: true,
        for_site_conditions: false,
        archived_at: None,
    });
    let references: Vec<Arc<dyn LibraryReferences>> = vec![library.clone()];
    let reconciler = LibraryReconciler::new(library.clone(), references);
    Catalog {
        library,
        reconciler,
        keep,
        merged,
        control,
        task: LibraryTaskId::new(),
    }
}

impl Catalog {
    fn manifest(&self) -> ReconcileManifest {
        let mut merge = BTreeMap::new();
        merge.insert(self.merged.0, "Struck-by object".to_string());
        ReconcileManifest {
            hazards: vec![ExpectedEntry {
                id: self.keep.0,
                name: "Struck by".to_string(),
                for_tasks: true,
                for_site_conditions: false,
                merge,
            }],
            controls: vec![ExpectedEntry {
                id: self.control.0,
                name: "Barricades".to_string(),
                for_tasks: true,
                for_site_conditions: false,
                merge: BTreeMap::new(),
            }],
        }
    }

    fn recommend(&self, hazard: LibraryHazardId) {
        self.library
            .insert_recommendation(Recommendation {
                subject: RecommendationSubject::Task(self.task),
                library_hazard_id: hazard,
                library_control_id: self.control,
            })
            .expect("recommendation stored");
    }
}

#[test]
fn merged_hazard_is_folded_into_its_replacement() {
    let c = catalog();
    c.recommend(c.merged);
    let report_id = DailyReportId::new();
    c.library
        .insert_report_hazard_control(ReportHazardControl {
            report_id,
            library_hazard_id: c.merged,
            library_control_id: c.control,
        })
        .expect("report row stored");
    let diff_id = Uuid::new_v4();
    c.library.insert_audit_diff(AuditEventDiff {
        id: diff_id,
        object_type: "task_hazard".to_string(),
        old_values: json!({ "library_hazard_id": c.merged.0.to_string() }),
        new_values: json!({ "library_hazard_id": c.merged.0.to_string(), "is_applicable": true }),
    });
    let unrelated = AuditEventDiff {
        id: Uuid::new_v4(),
        object_type: "task_control".to_string(),
        old_values: json!({ "library_hazard_id": c.merged.0.to_string() }),
        new_values: json!({}),
    };
    c.library.insert_audit_diff(unrelated.clone());

    let reports = c
        .reconciler
        .reconcile_manifest(&c.manifest())
        .expect("reconcile succeeds");
    let hazards = &reports[0];
    assert_eq!(hazards.kind, Some(LibraryKind::Hazard));
    assert_eq!(hazards.merged, 1);
    assert_eq!(hazards.deleted, 1);
    assert_eq!(hazards.references.rewritten, 2);
    assert_eq!(hazards.audit_diffs_rewritten, 1);

    assert_eq!(
        c.library.all_recommendations(),
        vec![Recommendation {
            subject: RecommendationSubject::Task(c.task),
            library_hazard_id: c.keep,
            library_control_id: c.control,
        }]
    );
    assert_eq!(
        c.library.report_hazard_controls(),
        vec![ReportHazardControl {
            report_id,
            library_hazard_id: c.keep,
            library_control_id: c.control,
        }]
    );
    let ids: Vec<LibraryHazardId> = c.library.hazards().iter().map(|hazard| hazard.id).collect();
    assert_eq!(ids, vec![c.keep]);

    let diffs = c.library.audit_diffs();
    let rewritten = diffs
        .iter()
        .find(|diff| diff.id == diff_id)
        .expect("diff kept");
    assert_eq!(rewritten.old_values["library_hazard_id"], c.keep.0.to_string());
    assert_eq!(rewritten.new_values["library_hazard_id"], c.keep.0.to_string());
    assert_eq!(rewritten.new_values["is_applicable"], true);
    let untouched = diffs
        .iter()
        .find(|diff| diff.id == unrelated.id)
        .expect("diff kept");
    assert_eq!(untouched, &unrelated);
}

#[test]
fn colliding_rewrite_deletes_the_duplicate_row() {
    let c = catalog();
    c.recommend(c.keep);
    c.recommend(c.merged);

    let reports = c
        .reconciler
        .reconcile_manifest(&c.manifest())
        .expect("reconcile succeeds");
    assert_eq!(reports[0].references.duplicates_deleted, 1);
    assert_eq!(c.library.all_recommendations().len(), 1);
    assert_eq!(c.library.all_recommendations()[0].library_hazard_id, c.keep);
}

#[test]
fn second_run_performs_no_writes() {
    let c = catalog();
    c.recommend(c.merged);
    let stray = LibraryHazardId::new();
    c.library.insert_hazard(LibraryHazard {
        id: stray,
        name: "Retired hazard".to_string(),
        for_tasks: true,
        for_site_conditions: true,
        archived_at: None,
    });
    let manifest = c.manifest();

    let first = c
        .reconciler
        .reconcile_manifest(&manifest)
        .expect("first run succeeds");
    assert!(first.iter().map(|report| report.writes()).sum::<usize>() > 0);
    assert_eq!(first[0].marked_inapplicable, 1);
    let retired = c
        .library
        .hazards()
        .into_iter()
        .find(|hazard| hazard.id == stray)
        .expect("unlisted hazard kept");
    assert!(!retired.for_tasks && !retired.for_site_conditions);

    let writes_before = c.library.writes();
    let second = c
        .reconciler
        .reconcile_manifest(&manifest)
        .expect("second run succeeds");
    for report in &second {
        assert_eq!(report.writes(), 0, "{:?}", report.kind);
    }
    assert_eq!(c.library.writes(), writes_before);
}

#[test]
fn new_entries_are_inserted_and_renames_applied() {
    let c = catalog();
    let mut manifest = c.manifest();
    manifest.hazards[0].name = "Struck by moving equipment".to_string();
    let added = Uuid::new_v4();
    manifest.controls.push(ExpectedEntry {
        id: added,
        name: "Exclusion zone".to_string(),
        for_tasks: true,
        for_site_conditions: true,
        merge: BTreeMap::new(),
    });

    let reports = c
        .reconciler
        .reconcile_manifest(&manifest)
        .expect("reconcile succeeds");
    assert_eq!(reports[0].updated, 1);
    assert_eq!(reports[1].inserted, 1);

    let renamed = c
        .library
        .hazards()
        .into_iter()
        .find(|hazard| hazard.id == c.keep)
        .expect("hazard kept");
    assert_eq!(renamed.name, "Struck by moving equipment");
    assert!(c
        .library
        .controls()
        .iter()
        .any(|control| control.id == LibraryControlId(added) && control.for_site_conditions));
}
