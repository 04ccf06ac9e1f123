use crate::infra::{InMemoryBlobStore, InMemoryRecordStore, InMemorySessionProvider};
use clap::Args;
use ethiolearn::error::AppError;
use ethiolearn::marketplace::{
    CourseDraft, Credentials, Decision, FileUpload, JobDraft, MarketplaceError,
    MarketplaceService, Role, Session, SessionProvider,
};
use std::sync::Arc;

type DemoService = MarketplaceService<InMemoryRecordStore, InMemoryBlobStore>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Course price in ETB used for the purchase walkthrough.
    #[arg(long, default_value_t = 500)]
    pub(crate) course_price: u32,
    /// Have the admin reject the receipt instead of approving it.
    #[arg(long)]
    pub(crate) reject_payment: bool,
    /// Skip the job application portion of the demo.
    #[arg(long)]
    pub(crate) skip_hiring: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        course_price,
        reject_payment,
        skip_hiring,
    } = args;

    let sessions = InMemorySessionProvider::with_cost(4);
    let service = MarketplaceService::new(
        Arc::new(InMemoryRecordStore::default()),
        Arc::new(InMemoryBlobStore::default()),
    );

    println!("EthioLearn marketplace demo");
    let instructor = register(&sessions, "tigist@ethiolearn.et", Role::Instructor)?;
    let learner = register(&sessions, "abebe@ethiolearn.et", Role::Learner)?;
    let admin = register(&sessions, "admin@ethiolearn.et", Role::Admin)?;
    let employer = register(&sessions, "dawit@ethiolearn.et", Role::Employer)?;

    let decision = if reject_payment {
        Decision::Reject
    } else {
        Decision::Approve
    };
    purchase_walkthrough(&service, &instructor, &learner, &admin, course_price, decision)?;

    if skip_hiring {
        return Ok(());
    }
    hiring_walkthrough(&service, &employer, &learner)
}

fn register(
    sessions: &InMemorySessionProvider,
    email: &str,
    role: Role,
) -> Result<Session, AppError> {
    let grant = sessions
        .sign_up(Credentials::new(email, "demo-password"), role)
        .map_err(MarketplaceError::from)?;
    println!("- Signed up {} as {}", grant.session.email, grant.session.role);
    Ok(grant.session)
}

fn purchase_walkthrough(
    service: &DemoService,
    instructor: &Session,
    learner: &Session,
    admin: &Session,
    price: u32,
    decision: Decision,
) -> Result<(), AppError> {
    println!("\nCourse purchase");
    let course = service.create_course(
        instructor,
        CourseDraft {
            title: "Intro to Rust".to_string(),
            description: "Ownership, borrowing and fearless concurrency".to_string(),
            price,
            phone_number: "+251912345678".to_string(),
        },
        Some(FileUpload::new("intro-to-rust.pdf", b"%PDF-1.7 demo".to_vec())),
    )?;
    println!(
        "- {} published \"{}\" for {} ETB (pay to {})",
        instructor.email,
        course.title,
        course.price,
        course.phone_number.as_deref().unwrap_or("-")
    );

    let payment = service.initiate_purchase(learner, &course.id)?;
    println!(
        "- {} started payment {} -> {}",
        learner.email,
        payment.id,
        payment.status.label()
    );

    match service.download_course_material(learner, &course.id) {
        Ok(_) => println!("  Unexpected: material released before approval"),
        Err(err) => println!("  Download before approval refused: {err}"),
    }

    let payment = service.submit_receipt(
        learner,
        &payment.id,
        FileUpload::new("telebirr-receipt.png", vec![0x89, b'P', b'N', b'G']),
    )?;
    println!(
        "- Receipt attached as {}",
        payment.receipt_storage_path.as_deref().unwrap_or("-")
    );

    let queue = service.payment_views(admin)?;
    println!("- Admin review queue: {} payment(s)", queue.len());
    for view in &queue {
        println!(
            "    {} | {} | {} ETB | can decide: {}",
            view.payment.id,
            view.course_title.as_deref().unwrap_or("unknown course"),
            view.payment.amount,
            view.can_decide
        );
    }

    let payment = service.decide_payment(admin, &payment.id, decision)?;
    println!("- Admin marked payment {}", payment.status.label());

    match service.download_course_material(learner, &course.id) {
        Ok(download) => println!(
            "- {} downloaded {} ({} bytes)",
            learner.email,
            download.file_name,
            download.bytes.len()
        ),
        Err(err) => println!("- Download refused: {err}"),
    }
    Ok(())
}

fn hiring_walkthrough(
    service: &DemoService,
    employer: &Session,
    learner: &Session,
) -> Result<(), AppError> {
    println!("\nJob application");
    let job = service.post_job(
        employer,
        JobDraft {
            title: "Software Developer".to_string(),
            company: "Addis Systems".to_string(),
            location: "Addis Ababa".to_string(),
            requirements: "Two years building web services".to_string(),
            description: Some("Build payment integrations for local banks".to_string()),
            salary: Some("15,000 - 25,000 ETB".to_string()),
        },
    )?;
    println!("- {} posted {} at {}", employer.email, job.title, job.company);

    let application = service.apply_to_job(
        learner,
        &job.id,
        FileUpload::new("abebe-cv.pdf", b"%PDF-1.4 cv".to_vec()),
    )?;
    println!(
        "- {} applied -> {}",
        learner.email,
        application.status.label()
    );

    for view in service.application_views(employer)? {
        println!(
            "    {} | {} | cv: {} | can decide: {}",
            view.application.id,
            view.job_title.as_deref().unwrap_or("unknown job"),
            view.has_cv,
            view.can_decide
        );
    }

    let cv = service.download_cv(employer, &application.id)?;
    println!("- Employer downloaded {} ({} bytes)", cv.file_name, cv.bytes.len());

    let application = service.decide_application(employer, &application.id, Decision::Reject)?;
    println!("- Employer marked application {}", application.status.label());

    for mine in service.applications(learner)? {
        println!("- {} sees application {} as {}", learner.email, mine.id, mine.status.label());
    }
    Ok(())
}
