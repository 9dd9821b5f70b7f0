//! The seven-step institution signup form.

use tutorhub_types::form::{FieldKind, FieldRule, FormDefinition, StepDefinition};

/// Name of the institution signup form; session identities are
/// `institution-signup/{session_id}`.
pub const INSTITUTION_SIGNUP_FORM: &str = "institution-signup";

pub const PHONE_FIELD: &str = "phone";
pub const PHONE_VERIFIED_FIELD: &str = "phone_verified";
pub const PHONE_VERIFIED_AT_FIELD: &str = "phone_verified_at";

/// Institution categories accepted by the backend.
pub const INSTITUTION_TYPES: &[&str] = &[
    "school",
    "college",
    "coaching_center",
    "university",
    "training_institute",
];

fn text(min_len: usize, max_len: usize) -> FieldKind {
    FieldKind::Text { min_len, max_len }
}

fn step(index: u32, title: &str, rules: Vec<FieldRule>) -> StepDefinition {
    StepDefinition {
        index,
        title: title.to_string(),
        rules,
    }
}

/// Build the institution signup form definition.
pub fn institution_signup_form() -> FormDefinition {
    FormDefinition {
        name: INSTITUTION_SIGNUP_FORM.to_string(),
        steps: vec![
            step(
                1,
                "Basic details",
                vec![
                    FieldRule::required("institution_name", text(3, 120)),
                    FieldRule::required(
                        "institution_type",
                        FieldKind::OneOf {
                            options: INSTITUTION_TYPES.iter().map(|t| t.to_string()).collect(),
                        },
                    ),
                    FieldRule::required("establishment_year", FieldKind::Year { min: 1800 }),
                    FieldRule::required("registration_number", text(4, 40)),
                ],
            ),
            step(
                2,
                "Contact",
                vec![
                    FieldRule::required("email", FieldKind::Email),
                    FieldRule::required(PHONE_FIELD, FieldKind::Phone),
                    FieldRule::required(PHONE_VERIFIED_FIELD, FieldKind::Accepted),
                    FieldRule::optional("website", FieldKind::Url),
                ],
            ),
            step(
                3,
                "Address",
                vec![
                    FieldRule::required("address_line", text(5, 200)),
                    FieldRule::required("city", text(2, 80)),
                    FieldRule::required("state", text(2, 80)),
                    FieldRule::required("pincode", FieldKind::Pincode),
                ],
            ),
            step(
                4,
                "Courses",
                vec![
                    FieldRule::required("course_categories", FieldKind::MultiSelect { min: 1 }),
                    FieldRule::required("teaching_modes", FieldKind::MultiSelect { min: 1 }),
                ],
            ),
            step(
                5,
                "Facilities",
                vec![
                    FieldRule::optional("facilities", FieldKind::MultiSelect { min: 1 }),
                    FieldRule::optional(
                        "student_capacity",
                        FieldKind::Integer {
                            min: 1,
                            max: 100_000,
                        },
                    ),
                ],
            ),
            step(
                6,
                "Documents",
                vec![
                    FieldRule::required("registration_certificate", FieldKind::FileKey),
                    FieldRule::optional("accreditation_certificate", FieldKind::FileKey),
                ],
            ),
            step(
                7,
                "Account",
                vec![
                    FieldRule::required("admin_name", text(2, 80)),
                    FieldRule::required("password", FieldKind::Password { min_len: 8 }),
                    FieldRule::required(
                        "confirm_password",
                        FieldKind::Confirms {
                            field: "password".to_string(),
                        },
                    ),
                    FieldRule::required("terms_accepted", FieldKind::Accepted),
                ],
            ),
        ],
        critical_fields: vec![
            "course_categories".to_string(),
            "teaching_modes".to_string(),
        ],
    }
}
