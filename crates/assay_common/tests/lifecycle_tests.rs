//! End-to-end flows through the tool façade against a temp project

use assay_common::knowledge::{Layer, RelationOutcome, RelationType};
use assay_common::phase::{EvidenceStub, Phase, Role, RoleAssignment};
use assay_common::projection;
use assay_common::tools::{DecideRequest, EvidenceRequest, ProposeRequest};
use assay_common::{ReliabilityEngine, ToolError, Tools};
use std::fs;
use tempfile::{tempdir, TempDir};

fn project() -> (Tools, TempDir) {
    let dir = tempdir().unwrap();
    let tools = Tools::open(dir.path()).unwrap();
    (tools, dir)
}

fn propose(tools: &mut Tools, title: &str, deps: &[&str], cl: i64) -> String {
    tools
        .propose(
            ProposeRequest::new(title, "content", "global", "system", "because")
                .with_dependencies(deps, cl),
        )
        .unwrap();
    assay_common::tools::slugify(title)
}

fn decision_request(title: &str, winner: &str) -> DecideRequest {
    DecideRequest {
        context: "ctx".to_string(),
        decision: "go".to_string(),
        rationale: "best".to_string(),
        consequences: "none".to_string(),
        ..DecideRequest::new(title, winner)
    }
}

fn operation_stub(holon_id: &str) -> EvidenceStub {
    EvidenceStub {
        evidence_type: "drr".to_string(),
        uri: "decisions/latest".to_string(),
        description: "ship it".to_string(),
        holon_id: Some(holon_id.to_string()),
    }
}

#[test]
fn test_full_lifecycle_reaches_l2_and_decision() {
    let (mut tools, _dir) = project();
    let id = propose(&mut tools, "Use Queue", &[], 3);
    assert_eq!(tools.machine().phase(), Phase::Abduction);

    tools.verify(&id, "{\"logic\":\"sound\"}", "PASS").unwrap();
    assert_eq!(tools.machine().phase(), Phase::Deduction);

    tools.test(&id, "internal", "load test green", "PASS").unwrap();
    assert_eq!(tools.store().get_holon(&id).unwrap().unwrap().layer, Layer::L2);
    assert!(tools.paths().holon_file("L2", &id).exists());

    let audit = tools.audit_hypothesis(&id, "vendor risk").unwrap();
    assert!(audit.contains("R_eff: 1.00"));

    tools.decide(decision_request("Queue Choice", &id)).unwrap();
    assert_eq!(tools.machine().phase(), Phase::Decision);

    let evidence_files = fs::read_dir(tools.paths().state_dir.join("evidence"))
        .unwrap()
        .count();
    assert_eq!(evidence_files, 3);
}

#[test]
fn test_operation_gate_follows_threshold() {
    let (mut tools, _dir) = project();
    let base = propose(&mut tools, "Base", &[], 3);
    tools.verify(&base, "{}", "PASS").unwrap();
    tools.test(&base, "internal", "ok", "PASS").unwrap();

    let top = propose(&mut tools, "Top", &[&base], 1);
    tools.verify(&top, "{}", "PASS").unwrap();
    tools.decide(decision_request("Adopt Top", &top)).unwrap();
    assert_eq!(tools.machine().phase(), Phase::Decision);

    let decider = RoleAssignment::new(Role::Decider);
    let denied = tools
        .transition("OPERATION", decider.clone(), Some(operation_stub(&top)))
        .unwrap_err();
    assert!(matches!(denied, ToolError::Denied(_)));
    assert_eq!(
        denied.to_string(),
        "Transition Denied: Reliability (0.60) is below threshold (0.80). Weakest link: base"
    );

    tools.machine_mut().state_mut().assurance_threshold = 0.5;
    let out = tools
        .transition("OPERATION", decider, Some(operation_stub(&top)))
        .unwrap();
    assert_eq!(out, "Transitioned to OPERATION (role Decider)");
    assert_eq!(tools.machine().state().phase, Phase::Operation);
}

#[test]
fn test_operation_gate_opens_when_evidence_improves() {
    let (mut tools, _dir) = project();
    let id = propose(&mut tools, "Service", &[], 3);
    tools
        .manage_evidence(
            EvidenceRequest::add(Phase::Deduction, &id, "verification", "stale check")
                .level("L1")
                .valid_until("2020-01-01"),
        )
        .unwrap();
    tools.decide(decision_request("Run Service", &id)).unwrap();

    let decider = RoleAssignment::new(Role::Decider);
    let denied = tools
        .transition("OPERATION", decider.clone(), Some(operation_stub(&id)))
        .unwrap_err();
    assert!(denied.to_string().contains("Reliability (0.10)"));

    let evidence_id = tools.store().get_evidence(&id).unwrap()[0].id.clone();
    tools
        .check_decay(None, Some(&evidence_id), Some("2099-01-01"), Some("renewal booked"))
        .unwrap();

    // Re-derive DECISION: the waiver does not touch holons
    assert_eq!(tools.machine().phase(), Phase::Decision);
    tools
        .transition("OPERATION", decider, Some(operation_stub(&id)))
        .unwrap();
}

#[test]
fn test_member_of_does_not_depress_member() {
    let (mut tools, _dir) = project();
    let context = propose(&mut tools, "Cache Decision", &[], 3);
    tools
        .manage_evidence(
            EvidenceRequest::add(Phase::Deduction, &context, "verification", "bad").verdict("fail"),
        )
        .unwrap();

    tools
        .propose(
            ProposeRequest::new("Redis", "c", "", "system", "").with_decision_context(&context),
        )
        .unwrap();
    tools.verify("redis", "{}", "PASS").unwrap();

    let engine = ReliabilityEngine::new(tools.store());
    assert_eq!(engine.compute(&context).unwrap().final_score, 0.0);
    assert_eq!(engine.compute("redis").unwrap().final_score, 1.0);
}

#[test]
fn test_dependency_cycle_skipped_through_store() {
    let (mut tools, _dir) = project();
    let x = propose(&mut tools, "X", &[], 3);
    let y = propose(&mut tools, "Y", &[&x], 3);

    // x is part of y; making y part of x would close the loop
    let outcome = tools
        .store()
        .create_relation(&y, RelationType::ComponentOf, &x, 3)
        .unwrap();
    assert_eq!(outcome, RelationOutcome::SkippedCycle);
    assert!(tools.store().dependencies_of(&x).unwrap().is_empty());

    assert!(tools
        .store()
        .create_relation(&x, RelationType::ComponentOf, &x, 3)
        .is_err());
}

#[test]
fn test_tampered_projection_repaired_on_sweep() {
    let (mut tools, _dir) = project();
    let id = propose(&mut tools, "Guarded", &[], 3);
    tools.verify(&id, "{}", "PASS").unwrap();

    let path = tools.paths().holon_file("L1", &id);
    let pristine = fs::read_to_string(&path).unwrap();
    fs::write(&path, pristine.replace("because", "trust me")).unwrap();
    assert!(projection::validate_file(&path).unwrap().tampered);

    let report = tools.check_integrity(None).unwrap();
    assert!(report.contains("regenerated from store"));
    assert_eq!(fs::read_to_string(&path).unwrap(), pristine);

    let target = path.to_string_lossy().to_string();
    let results: Vec<String> = tools
        .store()
        .audit_entries_for(&target)
        .unwrap()
        .into_iter()
        .map(|(_, result)| result)
        .collect();
    assert_eq!(results, vec!["ALERT", "SUCCESS"]);
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let mut tools = Tools::open(dir.path()).unwrap();
        propose(&mut tools, "Persisted", &[], 3);
        tools
            .transition(
                "ABDUCTION",
                RoleAssignment::new(Role::Abductor).with_session("s-9"),
                Some(EvidenceStub {
                    evidence_type: "note".to_string(),
                    uri: "notes/kickoff.md".to_string(),
                    ..Default::default()
                }),
            )
            .unwrap();
    }

    let tools = Tools::open(dir.path()).unwrap();
    assert_eq!(tools.machine().state().active_role.session_id, "s-9");
    assert!(tools.store().get_holon("persisted").unwrap().is_some());
    assert!(tools.status().unwrap().contains("Active role: Abductor (session s-9)"));
}
