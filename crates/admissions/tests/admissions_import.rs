use admissions::workflows::admissions::{
    AdmissionsImporter, ApplicantId, ApplicationStatus, ConflictDetector, ImportError,
    IntegrityWarning, OfferingId,
};

const APPLICATIONS: &str = "Application ID,Applicant ID,Cycle,Institution,Faculty,Course,Submitted At,Status\n\
app-1,stu-1,2026,Lakeside University,Science,Physics,2026-01-10T09:00:00Z,Accepted\n\
app-2,stu-1,2026,Harbour Polytechnic,Engineering,Civil,2026-01-12T09:00:00Z,accepted\n\
app-3,stu-2,2026,Lakeside University,Science,Physics,2026-01-11,Accepted\n\
app-4,stu-2,2026,Lakeside University,Science,Physics,2026-01-13,Accepted\n\
app-5,stu-3,2026,Harbour Polytechnic,Engineering,Civil,2026-01-09,Waitlisted\n";

const RECORDS: &str = "Applicant ID,Credits,Passes,GPA,Grades\n\
stu-1,120,6,3.5,Mathematics=B\n\
stu-2,95,,not-recorded,\n";

#[test]
fn imported_exports_feed_conflict_detection() {
    let applications =
        AdmissionsImporter::applications_from_reader(APPLICATIONS.as_bytes()).expect("parses");
    let records = AdmissionsImporter::records_from_reader(RECORDS.as_bytes()).expect("parses");

    assert_eq!(applications.len(), 5);
    assert_eq!(applications[4].status, ApplicationStatus::Waitlisted);
    assert_eq!(records[&ApplicantId("stu-2".to_string())].gpa, None);

    let report = ConflictDetector::default().detect(&applications, &records);

    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.applicant_id, ApplicantId("stu-1".to_string()));
    assert_eq!(conflict.priority_score.value(), 530.0);
    assert_eq!(
        conflict.offerings().cloned().collect::<Vec<_>>(),
        vec![
            OfferingId::new("Lakeside University", "Science", "Physics"),
            OfferingId::new("Harbour Polytechnic", "Engineering", "Civil"),
        ]
    );

    assert!(matches!(
        report.warnings.as_slice(),
        [IntegrityWarning::DuplicateAcceptance { applicant_id, .. }]
            if applicant_id == &ApplicantId("stu-2".to_string())
    ));
}

#[test]
fn missing_export_file_reports_io_error() {
    let result = AdmissionsImporter::applications_from_path("does/not/exist.csv");

    assert!(matches!(result, Err(ImportError::Io(_))));
}

#[test]
fn malformed_timestamp_names_the_offending_line() {
    let csv = "Application ID,Applicant ID,Cycle,Institution,Faculty,Course,Submitted At,Status\n\
app-1,stu-1,2026,Lakeside University,Science,Physics,2026-01-10,Accepted\n\
app-2,stu-1,2026,Lakeside University,Science,Chemistry,last tuesday,Accepted\n";

    let error = AdmissionsImporter::applications_from_reader(csv.as_bytes())
        .expect_err("timestamp rejected");

    assert!(error.to_string().contains("row 3"));
    assert!(error.to_string().contains("last tuesday"));
}
