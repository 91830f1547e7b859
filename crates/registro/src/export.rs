use anyhow::Result;
use std::io::Write;

use crate::types::AttendanceRecord;

const HEADER: [&str; 8] = [
    "Date",
    "Student Number",
    "Last Name",
    "First Name",
    "Course",
    "Subject",
    "Status",
    "Remarks",
];

/// Write attendance rows as CSV with a header line
pub fn write_csv<W: Write>(writer: W, records: &[AttendanceRecord]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(HEADER)?;

    for record in records {
        csv.write_record([
            record.date.format("%Y-%m-%d").to_string(),
            record.student_number.clone(),
            record.last_name.clone(),
            record.first_name.clone(),
            record.course_code.clone().unwrap_or_default(),
            record.subject_display(),
            record.status.label().to_string(),
            record.remarks.clone().unwrap_or_default(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn to_csv_bytes(records: &[AttendanceRecord]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, records)?;
    Ok(buffer)
}
