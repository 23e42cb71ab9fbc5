use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

use crate::db::CertificateListing;
use crate::storage::{file_name_of, public_url};

pub const CSV_HEADERS: [&str; 10] = [
    "certificate_id",
    "participant_name",
    "participant_email",
    "template_name",
    "status",
    "delivery_status",
    "pdf_url",
    "sent_at",
    "created_at",
    "updated_at",
];

/// Column titles of the spreadsheet report, in [`CSV_HEADERS`] order.
pub const XLSX_HEADERS: [&str; 10] = [
    "Certificate ID",
    "Participant Name",
    "Participant Email",
    "Template Name",
    "Status",
    "Delivery Status",
    "PDF URL",
    "Sent At",
    "Created At",
    "Updated At",
];

pub const XLSX_SHEET: &str = "Certificates";

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Absolute download URL of a certificate's PDF, empty when not generated.
pub fn pdf_url(base_url: Option<&str>, pdf_path: Option<&str>) -> String {
    match pdf_path.filter(|p| !p.is_empty()) {
        Some(path) => public_url(base_url, path),
        None => String::new(),
    }
}

/// Dispatch report with one row per certificate.
pub fn listings_to_csv(listings: &[CertificateListing], base_url: Option<&str>) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;
    for listing in listings {
        let cert = &listing.certificate;
        writer.write_record([
            cert.id.to_string(),
            listing.full_name.clone(),
            listing.email.clone(),
            listing.template_name.clone(),
            cert.status.clone(),
            cert.delivery_status.clone(),
            pdf_url(base_url, cert.pdf_path.as_deref()),
            timestamp(cert.sent_at),
            timestamp(Some(cert.created_at)),
            timestamp(Some(cert.updated_at)),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// The dispatch report as an `.xlsx` workbook with a single sheet.
pub fn listings_to_xlsx(
    listings: &[CertificateListing],
    base_url: Option<&str>,
) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(XLSX_SHEET)?;

    let bold = Format::new().set_bold();
    for (col, header) in (0u16..).zip(XLSX_HEADERS) {
        sheet.write_string_with_format(0, col, header, &bold)?;
    }

    for (row, listing) in (1u32..).zip(listings) {
        let cert = &listing.certificate;
        sheet.write_number(row, 0, cert.id as f64)?;
        let text = [
            listing.full_name.clone(),
            listing.email.clone(),
            listing.template_name.clone(),
            cert.status.clone(),
            cert.delivery_status.clone(),
            pdf_url(base_url, cert.pdf_path.as_deref()),
            timestamp(cert.sent_at),
            timestamp(Some(cert.created_at)),
            timestamp(Some(cert.updated_at)),
        ];
        for (col, value) in (1u16..).zip(text) {
            sheet.write_string(row, col, value)?;
        }
    }

    workbook.save_to_buffer()
}

/// Name of a certificate inside an archive; repeats get the id prepended.
fn archive_entry_name(listing: &CertificateListing, taken: &mut HashSet<String>) -> String {
    let id = listing.certificate.id;
    let name = listing
        .certificate
        .pdf_path
        .as_deref()
        .and_then(file_name_of)
        .map(str::to_string)
        .unwrap_or_else(|| format!("certificate-{id}.pdf"));
    if taken.insert(name.clone()) {
        return name;
    }
    let name = format!("{id}-{name}");
    taken.insert(name.clone());
    name
}

/// Zips already-loaded certificate PDFs.
pub fn zip_certificates(files: &[(&CertificateListing, Vec<u8>)]) -> zip::result::ZipResult<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o644);
    let mut taken = HashSet::new();

    for (listing, pdf) in files {
        zip.start_file(archive_entry_name(listing, &mut taken), options)?;
        zip.write_all(pdf)?;
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Certificate;
    use chrono::TimeZone;
    use std::io::Read;

    fn listing(id: i64, pdf_path: Option<&str>, name: &str) -> CertificateListing {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        CertificateListing {
            certificate: Certificate {
                id,
                participant_id: id,
                template_id: 1,
                pdf_path: pdf_path.map(str::to_string),
                status: if pdf_path.is_some() { "generated" } else { "failed" }.into(),
                delivery_status: "pending".into(),
                delivery_message: None,
                sent_at: None,
                last_error: None,
                created_at: at,
                updated_at: at,
            },
            full_name: name.into(),
            email: format!("p{id}@example.org"),
            template_name: "award.pdf".into(),
        }
    }

    #[test]
    fn csv_has_the_dispatch_columns() {
        let rows = [
            listing(1, Some("generated/ada.pdf"), "Lovelace, Ada"),
            listing(2, None, "Grace"),
        ];
        let csv = String::from_utf8(listings_to_csv(&rows, Some("https://certs.example.org")).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], CSV_HEADERS.join(","));
        assert_eq!(
            lines[1],
            "1,\"Lovelace, Ada\",p1@example.org,award.pdf,generated,pending,\
             https://certs.example.org/storage/generated/ada.pdf,,\
             2024-06-01T12:00:00.000Z,2024-06-01T12:00:00.000Z"
        );
        assert!(lines[2].starts_with("2,Grace,p2@example.org,award.pdf,failed,pending,,,"));
    }

    #[test]
    fn workbook_report_reads_back() {
        use calamine::{open_workbook_auto_from_rs, Data, Reader};

        let rows = [
            listing(1, Some("generated/ada.pdf"), "Ada"),
            listing(2, None, "Grace"),
        ];
        let bytes = listings_to_xlsx(&rows, None).unwrap();

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec![XLSX_SHEET.to_string()]);
        let range = workbook.worksheet_range(XLSX_SHEET).unwrap();
        let cells: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();

        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0], XLSX_HEADERS.map(str::to_string).to_vec());
        assert_eq!(range.get((1, 0)), Some(&Data::Float(1.0)));
        assert_eq!(cells[1][1], "Ada");
        assert_eq!(cells[1][6], "/storage/generated/ada.pdf");
        assert_eq!(cells[1][8], "2024-06-01T12:00:00.000Z");
        assert_eq!(cells[2][4], "failed");
        assert_eq!(cells[2][6], "");
    }

    #[test]
    fn archive_contains_each_pdf_once() {
        let a = listing(1, Some("generated/same.pdf"), "A");
        let b = listing(2, Some("generated/same.pdf"), "B");
        let bytes = zip_certificates(&[(&a, b"one".to_vec()), (&b, b"two".to_vec())]).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut second = String::new();
        archive.by_name("2-same.pdf").unwrap().read_to_string(&mut second).unwrap();
        assert_eq!(second, "two");
    }
}
