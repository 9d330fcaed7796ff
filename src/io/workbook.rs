//! Spreadsheet export of the Zernike decomposition and the error trace

use crate::io::error::{WriteError, encode_error};
use crate::io::report::Report;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::Path;

/// Name of the summary sheet
pub const SUMMARY_SHEET: &str = "Zernike decomposition";
/// Name of the per-iteration sheet
pub const TRACE_SHEET: &str = "Error trace";
/// Name of the sheet holding every fitted coefficient
pub const COEFFICIENT_SHEET: &str = "Zernike coefficients";

/// Encode the report workbook in memory
///
/// # Errors
///
/// Returns [`WriteError::Encode`] (reported against `target`) when the
/// workbook cannot be built
pub fn workbook_bytes(report: &Report<'_>, target: &Path) -> Result<Vec<u8>, WriteError> {
    build(report).map_err(|e| encode_error(target, "XLSX", &e))
}

fn build(report: &Report<'_>) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    workbook.push_worksheet(summary_sheet(report)?);
    workbook.push_worksheet(trace_sheet(report)?);
    workbook.push_worksheet(coefficient_sheet(report)?);
    workbook.save_to_buffer()
}

fn summary_sheet(report: &Report<'_>) -> Result<Worksheet, XlsxError> {
    let bold = Format::new().set_bold();
    let two_decimals = Format::new().set_num_format("0.00");
    let result = report.result();

    let mut sheet = Worksheet::new();
    sheet.set_name(SUMMARY_SHEET)?;
    sheet.set_column_width(0, 32)?;
    sheet.set_column_width(1, 30)?;
    sheet.set_column_width(2, 36)?;
    sheet.set_column_width(3, 16)?;

    sheet.write_string_with_format(0, 0, report.source_label(), &bold)?;

    sheet.write_string_with_format(2, 0, "PSF Parameters", &bold)?;
    for (row, entry) in (3_u32..).zip(result.psf_parameters().entries()) {
        let label = if entry.unit.is_empty() {
            entry.name.to_string()
        } else {
            format!("{} in {}", entry.name, entry.unit)
        };
        sheet.write_string(row, 0, label)?;
        sheet.write_number(row, 1, entry.value)?;
    }

    sheet.write_string_with_format(2, 2, "Phase Retrieval Parameters", &bold)?;
    let fit_entries = result.fit_parameters().entries();
    for (row, entry) in (3_u32..).zip(fit_entries.iter().take(3)) {
        sheet.write_string(row, 2, entry.name)?;
        sheet.write_number(row, 3, entry.value)?;
    }
    sheet.write_string(6, 2, result.status_line())?;
    sheet.write_string_with_format(7, 2, result.stop_reason().description(), &bold)?;
    if let Some(entry) = fit_entries.get(3) {
        sheet.write_string(8, 2, format!("{} in {}", entry.name, entry.unit))?;
        sheet.write_number(8, 3, entry.value)?;
    }

    sheet.write_string_with_format(9, 0, "Zernike Decomposition Results", &bold)?;
    for (col, header) in (0_u16..).zip(["Noll Order", "Noll Name", "Value", "Within tolerance"]) {
        sheet.write_string_with_format(10, col, header, &bold)?;
    }
    for (row, coefficient) in (11_u32..).zip(report.coefficients()) {
        let format = if coefficient.important { &bold } else { &Format::new() };
        sheet.write_number_with_format(row, 0, coefficient.order as f64, format)?;
        sheet.write_string_with_format(row, 1, coefficient.name, format)?;
        sheet.write_number_with_format(row, 2, coefficient.value, &two_decimals)?;
        sheet.write_boolean(row, 3, coefficient.within_tolerance)?;
    }

    Ok(sheet)
}

fn trace_sheet(report: &Report<'_>) -> Result<Worksheet, XlsxError> {
    let bold = Format::new().set_bold();
    let mut sheet = Worksheet::new();
    sheet.set_name(TRACE_SHEET)?;

    for (col, header) in (0_u16..).zip([
        "Iteration",
        "MSE",
        "Relative MSE difference",
        "Relative pupil difference",
        "Elapsed (s)",
    ]) {
        sheet.write_string_with_format(0, col, header, &bold)?;
        sheet.set_column_width(col, 26)?;
    }
    for (row, record) in (1_u32..).zip(report.result().trace()) {
        sheet.write_number(row, 0, record.iteration as f64)?;
        sheet.write_number(row, 1, record.mse)?;
        if let Some(diff) = record.mse_diff.filter(|d| d.is_finite()) {
            sheet.write_number(row, 2, diff)?;
        }
        sheet.write_number(row, 3, record.pupil_diff)?;
        sheet.write_number(row, 4, record.elapsed.as_secs_f64())?;
    }

    Ok(sheet)
}

fn coefficient_sheet(report: &Report<'_>) -> Result<Worksheet, XlsxError> {
    let bold = Format::new().set_bold();
    let mut sheet = Worksheet::new();
    sheet.set_name(COEFFICIENT_SHEET)?;

    for (col, header) in (0_u16..).zip(["Noll Order", "Phase (waves)", "Magnitude"]) {
        sheet.write_string_with_format(0, col, header, &bold)?;
        sheet.set_column_width(col, 18)?;
    }
    let zernike = report.zernike();
    for (row, (order, (phase, magnitude))) in (1_u32..).zip(
        (1_usize..).zip(
            zernike
                .phase_coefficients()
                .iter()
                .zip(zernike.magnitude_coefficients()),
        ),
    ) {
        sheet.write_number(row, 0, order as f64)?;
        sheet.write_number(row, 1, *phase)?;
        sheet.write_number(row, 2, *magnitude)?;
    }

    Ok(sheet)
}
