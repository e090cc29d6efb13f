//! Type checker tests over linked programs.

use stlang::linker::link;
use stlang::parser::Parser;
use stlang::typecheck::{check_program, TypeError};

fn check(sources: &[&str]) -> Result<(), Vec<TypeError>> {
    let files = sources
        .iter()
        .map(|source| {
            Parser::new(source)
                .parse_source_file()
                .expect("parse failed")
        })
        .collect::<Vec<_>>();
    let program = link(&files).expect("link failed");
    check_program(&program)
}

fn assert_error_containing(result: Result<(), Vec<TypeError>>, needle: &str) {
    let errors = result.expect_err("expected type errors");
    assert!(
        errors.iter().any(|e| e.to_string().contains(needle)),
        "no error mentions '{}': {:#?}",
        needle,
        errors
    );
}

// ============================================
// 1. Constants and states
// ============================================

#[test]
fn test_const_value_must_match_declared_type() {
    assert_error_containing(
        check(&[r#"module m; const int kBad = "text";"#]),
        "constant 'm::kBad'",
    );
}

#[test]
fn test_state_parameter_types() {
    assert_error_containing(
        check(&[r#"
module m;
state sSession(int) { kLive }
transition tBad() {
  pre_states { sSession("one") = [kLive]; }
}
"#]),
        "state parameter 0",
    );
}

#[test]
fn test_state_parameter_must_be_constant() {
    assert_error_containing(
        check(&[r#"
module m;
state sSession(int) { kLive }
transition tBad() {
  int counter;
  pre_states { sSession(counter) = [kLive]; }
}
"#]),
        "constant expression",
    );
}

#[test]
fn test_pre_state_value_membership() {
    assert_error_containing(
        check(&[r#"
module m;
state sSession() { kLive, kDead }
transition tBad() {
  pre_states { sSession() = [kLive, kZombie]; }
}
"#]),
        "kZombie",
    );
}

// ============================================
// 2. Event call sites
// ============================================

#[test]
fn test_event_argument_types() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
event eSend(int id) = external "x";
transition tBad() {
  events { rA -> eSend("five") -> rB; }
}
"#]),
        "expected int",
    );
}

#[test]
fn test_transition_param_flows_into_event() {
    check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
event eSend(int id, string tag) = external "x";
transition tGood(int id, string tag) {
  events { rA -> eSend(id, tag) -> rB; }
}
"#])
    .expect("expected a well-typed program");
}

#[test]
fn test_ref_arg_must_be_local_lvalue() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
event eFill(&int slot) = external "x";
transition tBad() {
  events { rA -> eFill(42) -> rB; }
}
"#]),
        "lvalue",
    );
}

#[test]
fn test_ref_arg_forwarding_through_composite() {
    check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
event eInner(&int slot) = external "x";
event eOuter(&int slot) = eInner(slot);
transition tGood() {
  int slot;
  events { rA -> eOuter(slot) -> rB; }
}
"#])
    .expect("forwarded references must type-check");
}

#[test]
fn test_ref_arg_cannot_forward_by_value_param() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
event eInner(&int slot) = external "x";
event eOuter(int slot) = eInner(slot);
"#]),
        "reference parameter",
    );
}

// ============================================
// 3. Message literals
// ============================================

#[test]
fn test_unknown_field_rejected() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
message mMsg { required int id; }
event eSend(mMsg msg) = external "x";
transition tBad() {
  events { rA -> eSend(mMsg { id = 1; ghost = 2; }) -> rB; }
}
"#]),
        "no such field",
    );
}

#[test]
fn test_duplicate_field_assignment_rejected() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
message mMsg { required int id; }
event eSend(mMsg msg) = external "x";
transition tBad() {
  events { rA -> eSend(mMsg { id = 1; id = 2; }) -> rB; }
}
"#]),
        "more than once",
    );
}

#[test]
fn test_nested_message_accepts_only_declared_literal() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
message mInner { required int id; }
message mOther { required int id; }
message mOuter { required mInner inner; }
event eSend(mOuter msg) = external "x";
transition tBad() {
  events { rA -> eSend(mOuter { inner = mOther { id = 1; }; }) -> rB; }
}
"#]),
        "message literal 'm::mOther'",
    );
}

#[test]
fn test_repeated_field_takes_array_literal() {
    check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
message mItem { required int id; }
message mBatch { repeated mItem items; }
event eSend(mBatch msg) = external "x";
transition tGood() {
  events { rA -> eSend(mBatch { items = mItem [ { id = 1; }, { id = 2; } ]; }) -> rB; }
}
"#])
    .expect("array literal into repeated field must type-check");
}

#[test]
fn test_repeated_field_rejects_object_literal() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
message mItem { required int id; }
message mBatch { repeated mItem items; }
event eSend(mBatch msg) = external "x";
transition tBad() {
  events { rA -> eSend(mBatch { items = mItem { id = 1; }; }) -> rB; }
}
"#]),
        "array literal",
    );
}

#[test]
fn test_array_message_parameter_takes_array_literal() {
    check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
message mBatch[] { required int id; }
event eSend(mBatch batch) = external "x";
transition tGood() {
  events { rA -> eSend(mBatch [ { id = 1; } ]) -> rB; }
}
"#])
    .expect("array literal for array message must type-check");
}

// ============================================
// 4. Qualifiers
// ============================================

#[test]
fn test_qualifier_return_type_at_call_site() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
qualifier string qName() = external "x";
message mMsg { required int id; }
event eSend(mMsg msg) = external "y";
transition tBad() {
  events { rA -> eSend(mMsg { id = qName(); }) -> rB; }
}
"#]),
        "return of 'm::qName'",
    );
}

#[test]
fn test_qualifier_argument_types() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
qualifier int qPick(int bound) = external "x";
message mMsg { required int id; }
event eSend(mMsg msg) = external "y";
transition tBad() {
  events { rA -> eSend(mMsg { id = qPick(true); }) -> rB; }
}
"#]),
        "argument 0",
    );
}

#[test]
fn test_qualifier_write_target_type() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
qualifier int qGen() = external "x";
message mMsg { required int id; }
event eSend(mMsg msg) = external "y";
transition tBad() {
  string slot;
  events { rA -> eSend(mMsg { id = qGen() -> slot; }) -> rB; }
}
"#]),
        "write to 'slot'",
    );
}

#[test]
fn test_qualifier_write_requires_known_local() {
    assert_error_containing(
        check(&[r#"
module m;
role rA { string ip; }
role rB { string ip; }
qualifier int qGen() = external "x";
message mMsg { required int id; }
event eSend(mMsg msg) = external "y";
transition tBad() {
  events { rA -> eSend(mMsg { id = qGen() -> nowhere; }) -> rB; }
}
"#]),
        "unknown local 'nowhere'",
    );
}

// ============================================
// 5. Encodings and roles
// ============================================

#[test]
fn test_bytestream_requires_external_reference() {
    assert_error_containing(
        check(&[r#"module m; message mRaw { encode "bytestream"; required int x; }"#]),
        "external codec reference",
    );
}

#[test]
fn test_role_fields_are_scalar() {
    assert_error_containing(
        check(&[r#"
module m;
message mMsg { required int id; }
role rBad { mMsg payload; }
"#]),
        "scalar",
    );
}

#[test]
fn test_binding_argument_types() {
    assert_error_containing(
        check(&[r#"
module m;
transition tDecl(int id) {
}
transition tBound = tDecl("one");
"#]),
        "expected int",
    );
}
