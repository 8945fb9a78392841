use super::*;

#[test]
fn construction_errors_are_recoverable() {
    let err = Error::InvalidIntWidth(0);
    assert_eq!(err.class(), ErrorClass::ConstructionFailure);
    assert!(err.class().is_recoverable());
}

#[test]
fn ownership_errors_are_not_recoverable() {
    let err = Error::OwnerMismatch {
        expected: Owner::Caller,
        found: Owner::Engine(3),
    };
    assert_eq!(err.class(), ErrorClass::OwnershipViolation);
    assert!(!err.class().is_recoverable());
}

#[test]
fn state_and_lookup_classes() {
    assert_eq!(Error::Disposed.class(), ErrorClass::StateViolation);
    assert_eq!(
        Error::IncompleteType("node".into()).class(),
        ErrorClass::StateViolation
    );
    assert_eq!(Error::ModuleNotFound.class(), ErrorClass::LookupFailure);
    assert_eq!(
        Error::Verification {
            diagnostic: String::new()
        }
        .class(),
        ErrorClass::VerificationFailure
    );
}

#[test]
fn messages_name_the_problem() {
    let err = Error::TypeMismatch {
        expected: "i32".into(),
        found: "float".into(),
    };
    assert_eq!(err.to_string(), "type mismatch: expected `i32`, found `float`");
    assert_eq!(
        Error::InvalidIntWidth(129).to_string(),
        "invalid integer width 129: expected 1..=128"
    );
}
