//! Human-readable output for the command line.

use std::fmt::Write;

use helpdesk_client::TicketForm;

use crate::reconciler::MigrationOutcome;
use crate::report::{ConditionCheck, MigrationReport};

/// One line per form: id, name, field and condition counts
pub fn render_forms(account: &str, forms: &[TicketForm]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ticket form(s) in {}", forms.len(), account);
    for form in forms {
        let _ = writeln!(
            out,
            "  {:>12}  {}  ({} fields, {} conditions{})",
            form.id,
            form.name,
            form.ticket_field_ids.len(),
            form.condition_count(),
            if form.active == Some(false) { ", inactive" } else { "" }
        );
    }
    out
}

/// Summary of a migration outcome
pub fn render_outcome(outcome: &MigrationOutcome) -> String {
    let mut out = String::new();
    match outcome {
        MigrationOutcome::Success {
            source_form,
            migrated_form,
            field_mappings,
            conditions,
            report,
        } => {
            let _ = writeln!(
                out,
                "Migrated form '{}' ({} -> {})",
                source_form.name, source_form.id, migrated_form.id
            );
            let _ = writeln!(out, "Field mappings: {}", field_mappings.len());
            render_conditions(&mut out, conditions);
            render_report(&mut out, report);
        }
        MigrationOutcome::Failed {
            error,
            failed_at,
            field_mappings,
            attempted_payload,
            report,
        } => {
            let _ = writeln!(out, "Migration of form {} FAILED after stage {}", report.form_id, failed_at);
            let _ = writeln!(out, "Error: {}", error);
            let _ = writeln!(out, "Field mappings so far: {}", field_mappings.len());
            if let Some(payload) = attempted_payload {
                let _ = writeln!(
                    out,
                    "Attempted payload: '{}' with {} fields",
                    payload.name,
                    payload.ticket_field_ids.len()
                );
            }
            render_report(&mut out, report);
        }
    }
    out
}

fn render_conditions(out: &mut String, check: &ConditionCheck) {
    let _ = writeln!(
        out,
        "Original conditions: end_user={}, agent={}, total={}",
        check.original.end_user,
        check.original.agent,
        check.original.total()
    );
    let _ = writeln!(
        out,
        "Migrated conditions: end_user={}, agent={}, total={}",
        check.migrated.end_user,
        check.migrated.agent,
        check.migrated.total()
    );
    if check.all_lost() {
        let _ = writeln!(out, "WARNING: all conditions were lost during migration");
    } else if check.discrepancy {
        let _ = writeln!(
            out,
            "WARNING: condition count discrepancy (original={}, migrated={})",
            check.original.total(),
            check.migrated.total()
        );
    }
}

fn render_report(out: &mut String, report: &MigrationReport) {
    let counts = &report.counts;
    let _ = writeln!(
        out,
        "Fields: {} built-in, {} matched, {} created, {} failed, {} skipped",
        counts.fields_builtin,
        counts.fields_matched,
        counts.fields_created,
        counts.fields_failed,
        counts.fields_skipped
    );
    if counts.custom_objects_created + counts.custom_objects_existing + counts.custom_objects_failed > 0 {
        let _ = writeln!(
            out,
            "Custom objects: {} existing, {} created, {} failed",
            counts.custom_objects_existing, counts.custom_objects_created, counts.custom_objects_failed
        );
    }
    if !report.missing_field_ids.is_empty() {
        let ids: Vec<String> = report.missing_field_ids.iter().map(u64::to_string).collect();
        let _ = writeln!(out, "Missing fields: {}", ids.join(", "));
    }
    for error in &report.errors {
        match &error.subject {
            Some(subject) => {
                let _ = writeln!(out, "  error [{:?}] {}: {}", error.phase, subject, error.message);
            }
            None => {
                let _ = writeln!(out, "  error [{:?}] {}", error.phase, error.message);
            }
        }
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "  warning: {}", warning);
    }
    let _ = writeln!(out, "Run id: {}", report.run_id);
}
