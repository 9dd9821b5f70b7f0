//! Form definitions shipped with Tutorhub.

pub mod institution;

pub use institution::{INSTITUTION_SIGNUP_FORM, institution_signup_form};
