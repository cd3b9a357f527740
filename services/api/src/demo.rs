use crate::infra::build_registration_stack;
use chrono::Utc;
use clap::Args;
use exam_registration::config::RegistrationConfig;
use exam_registration::error::AppError;
use exam_registration::workflows::registration::form::{
    EducationField, ExperienceField, PersonalField,
};
use exam_registration::workflows::registration::steps::DocumentKind;
use exam_registration::workflows::registration::{
    ApplicationQuery, FieldUpdate, NavigationOutcome, PostId, RegistrationRepository,
    RegistrationService, SessionView, StartSession, StepId, UserId,
};
use serde_json::json;

const DEMO_DISTRICTS: [&str; 5] = ["Ranchi", "Dhanbad", "Bokaro", "Hazaribagh", "Dumka"];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Candidate identifier used for the walk-through
    #[arg(long, default_value = "demo-candidate")]
    pub(crate) user: String,
    /// Post the candidate applies for
    #[arg(long, default_value = "staff-nurse-2025")]
    pub(crate) post: String,
    /// Reservation category (general, obc, ews, sc, st); sc and st are fee exempt
    #[arg(long, default_value = "st")]
    pub(crate) category: String,
    /// Mobile number to verify before starting
    #[arg(long, default_value = "9876543210")]
    pub(crate) phone: String,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        user,
        post,
        category,
        phone,
    } = args;

    let config = RegistrationConfig {
        post_code: post.clone(),
        ..RegistrationConfig::default()
    };
    let stack = build_registration_stack(&config)?;
    let service = stack.service.as_ref();
    let user = UserId(user);

    println!("Exam registration demo");
    match stack.verifier.request_at(&phone, Utc::now()) {
        Ok(record) => match stack.verifier.verify(&phone, &record.code) {
            Ok(()) => println!("- phone {} verified", record.phone),
            Err(err) => println!("- phone verification failed: {err}"),
        },
        Err(err) => println!("- could not send verification code: {err}"),
    }

    let view = service.start_session(StartSession {
        user_id: user.clone(),
        post_id: PostId(post),
        draft_id: None,
    })?;
    render_progress("Session started", &view);

    for (field, value) in [
        (PersonalField::FirstName, "Asha"),
        (PersonalField::LastName, "Kumari"),
        (PersonalField::Mobile, phone.as_str()),
        (PersonalField::Email, "asha@example.com"),
        (PersonalField::DateOfBirth, "1998-04-12"),
    ] {
        service.update_field(
            &user,
            FieldUpdate::Personal {
                field,
                value: json!(value),
            },
        )?;
    }
    step_to(service, &user, StepId(2))?;

    service.update_field(
        &user,
        FieldUpdate::Other {
            field: "category".to_string(),
            value: json!(category),
        },
    )?;
    step_to(service, &user, StepId(3))?;

    for (field, value) in [
        (EducationField::School, "Govt. High School, Ranchi"),
        (EducationField::Board, "JAC"),
        (EducationField::Year, "2014"),
    ] {
        service.update_field(
            &user,
            FieldUpdate::Education {
                index: 0,
                field,
                value: json!(value),
            },
        )?;
    }
    for (slot, district) in DEMO_DISTRICTS.iter().enumerate() {
        service.update_field(
            &user,
            FieldUpdate::DistrictPreference {
                slot,
                district: district.to_string(),
            },
        )?;
    }
    step_to(service, &user, StepId(4))?;

    service.update_field(
        &user,
        FieldUpdate::Experience {
            index: 0,
            field: ExperienceField::Designation,
            value: json!("Staff Nurse"),
        },
    )?;
    step_to(service, &user, StepId(5))?;

    for (kind, file_name) in [
        (DocumentKind::Photo, "photo.jpg"),
        (DocumentKind::Signature, "signature.jpg"),
    ] {
        service.update_field(
            &user,
            FieldUpdate::Document {
                document_type: kind,
                file_name: file_name.to_string(),
                file_path: format!("uploads/{user}/{file_name}"),
            },
        )?;
    }
    step_to(service, &user, StepId(6))?;

    let payment = service.settle_payment(&user)?;
    println!(
        "\nPayment {} | amount {} | method {}",
        payment.status.label(),
        payment.amount,
        payment.method
    );
    step_to(service, &user, StepId(7))?;

    service.update_field(&user, FieldUpdate::Declaration { accepted: true })?;
    let record = service.submit(&user)?;
    println!(
        "\nSubmitted application {} ({})",
        record.application_number, record.status
    );

    if let Some(report) = service.flush().await {
        println!(
            "- {} section saves written | {} failed",
            report.saved,
            report.failed.len()
        );
    }
    let stored = stack
        .repository
        .applications()
        .map(|records| records.len())
        .unwrap_or_default();
    println!("- {stored} application(s) in the store");

    render_progress("Final state", &service.session(&user)?);

    match stack.admin.export_applications(&ApplicationQuery::default()) {
        Ok(csv) => {
            println!("\nAdmin export");
            print!("{csv}");
        }
        Err(err) => println!("\nAdmin export failed: {err}"),
    }

    Ok(())
}

fn step_to<R>(
    service: &RegistrationService<R>,
    user: &UserId,
    target: StepId,
) -> Result<(), AppError>
where
    R: RegistrationRepository + 'static,
{
    match service.navigate(user, target)? {
        NavigationOutcome::Rejected(blocked) => {
            println!("- blocked at step {}: {}", blocked.step, blocked.reason);
        }
        NavigationOutcome::Moved { from, to, .. } => println!("- step {from} -> {to}"),
        NavigationOutcome::Stayed { step } => println!("- stayed on step {step}"),
    }
    Ok(())
}

fn render_progress(heading: &str, view: &SessionView) {
    println!("\n{heading} (current step {})", view.current_step);
    for step in &view.steps {
        let marker = if step.id == view.current_step {
            '>'
        } else if step.completed {
            'x'
        } else {
            ' '
        };
        println!(
            "  [{marker}] {}. {:<24} {}",
            step.id,
            step.title,
            step.status.label()
        );
    }
    if view.submitted {
        println!("  application submitted; editing is locked");
    }
}
