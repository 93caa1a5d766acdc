//! Descriptive metadata extracted from a DICOM header.

use serde::{Deserialize, Serialize};

use crate::format::dicom::{DataSet, DicomFile, Tag};

use super::normalize::Window;

const UNKNOWN: &str = "Unknown";

/// Descriptive attributes of one image.
///
/// Text attributes default to `"Unknown"`; numeric attributes to `None`.
/// Extraction never fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub patient_id: String,
    pub patient_name: String,
    pub patient_birth_date: String,
    pub patient_sex: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub study_date: String,
    pub study_time: String,
    pub acquisition_date: String,
    pub acquisition_time: String,
    pub modality: String,
    pub manufacturer: String,
    pub institution_name: String,
    pub study_description: String,
    pub series_description: String,
    pub body_part_examined: String,
    pub photometric_interpretation: String,
    pub transfer_syntax: String,
    pub series_number: Option<i64>,
    pub instance_number: Option<i64>,
    pub rows: Option<u16>,
    pub columns: Option<u16>,
    pub number_of_frames: Option<u32>,
    pub bits_allocated: Option<u16>,
    /// Row spacing, column spacing (mm)
    pub pixel_spacing: Option<[f64; 2]>,
    pub slice_thickness: Option<f64>,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        let unknown = || UNKNOWN.to_string();
        Self {
            patient_id: unknown(),
            patient_name: unknown(),
            patient_birth_date: unknown(),
            patient_sex: unknown(),
            study_instance_uid: unknown(),
            series_instance_uid: unknown(),
            sop_instance_uid: unknown(),
            study_date: unknown(),
            study_time: unknown(),
            acquisition_date: unknown(),
            acquisition_time: unknown(),
            modality: unknown(),
            manufacturer: unknown(),
            institution_name: unknown(),
            study_description: unknown(),
            series_description: unknown(),
            body_part_examined: unknown(),
            photometric_interpretation: unknown(),
            transfer_syntax: unknown(),
            series_number: None,
            instance_number: None,
            rows: None,
            columns: None,
            number_of_frames: None,
            bits_allocated: None,
            pixel_spacing: None,
            slice_thickness: None,
            window_center: None,
            window_width: None,
        }
    }
}

impl ImageMetadata {
    pub fn from_file(file: &DicomFile) -> Self {
        let ds = &file.dataset;
        let text = |tag: Tag| ds.string(tag).unwrap_or_else(|| UNKNOWN.to_string());
        let integer = |tag: Tag| ds.number(tag).map(|n| n as i64);

        Self {
            patient_id: text(Tag::PATIENT_ID),
            patient_name: text(Tag::PATIENT_NAME),
            patient_birth_date: text(Tag::PATIENT_BIRTH_DATE),
            patient_sex: text(Tag::PATIENT_SEX),
            study_instance_uid: text(Tag::STUDY_INSTANCE_UID),
            series_instance_uid: text(Tag::SERIES_INSTANCE_UID),
            sop_instance_uid: text(Tag::SOP_INSTANCE_UID),
            study_date: text(Tag::STUDY_DATE),
            study_time: text(Tag::STUDY_TIME),
            acquisition_date: text(Tag::ACQUISITION_DATE),
            acquisition_time: text(Tag::ACQUISITION_TIME),
            modality: text(Tag::MODALITY),
            manufacturer: text(Tag::MANUFACTURER),
            institution_name: text(Tag::INSTITUTION_NAME),
            study_description: text(Tag::STUDY_DESCRIPTION),
            series_description: text(Tag::SERIES_DESCRIPTION),
            body_part_examined: text(Tag::BODY_PART_EXAMINED),
            photometric_interpretation: text(Tag::PHOTOMETRIC_INTERPRETATION),
            transfer_syntax: file.transfer_syntax.name().to_string(),
            series_number: integer(Tag::SERIES_NUMBER),
            instance_number: integer(Tag::INSTANCE_NUMBER),
            rows: ds.u16(Tag::ROWS),
            columns: ds.u16(Tag::COLUMNS),
            number_of_frames: ds.number(Tag::NUMBER_OF_FRAMES).map(|n| n as u32),
            bits_allocated: ds.u16(Tag::BITS_ALLOCATED),
            pixel_spacing: pixel_spacing(ds),
            slice_thickness: ds.number(Tag::SLICE_THICKNESS),
            window_center: ds.number(Tag::WINDOW_CENTER),
            window_width: ds.number(Tag::WINDOW_WIDTH),
        }
    }

    /// The file's first display window, if both center and width are present.
    pub fn window(&self) -> Option<Window> {
        Some(Window::new(self.window_center?, self.window_width?))
    }
}

fn pixel_spacing(ds: &DataSet) -> Option<[f64; 2]> {
    match ds.numbers(Tag::PIXEL_SPACING).as_slice() {
        [row, col, ..] => Some([*row, *col]),
        [both] => Some([*both, *both]),
        [] => None,
    }
}
