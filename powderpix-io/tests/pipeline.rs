use approx::assert_abs_diff_eq;
use powderpix_algorithms::{integrate, ImageInput, IntegrationConfig, XAxis};
use powderpix_io::{
    load_metadata, read_text_image, read_text_mask, save_calibration, CalibrationFile,
    DataFileWriter, Tilt,
};
use std::fmt::Write as _;
use tempfile::tempdir;

#[test]
fn test_text_image_to_profile_csv() {
    let dir = tempdir().unwrap();
    let calibration = CalibrationFile {
        pixels: [12, 8],
        pixel_size: 0.1,
        beam_centre: [6.0, 4.0],
        distance: 50.0,
        wavelength: Some(1.0),
        energy_kev: None,
        tilt: Tilt::default(),
        exposure_time: None,
    };
    save_calibration(dir.path().join("detector.json"), &calibration).unwrap();

    let mut image_text = String::from("# flat field\n");
    let mut mask_text = String::new();
    for row in 0..8 {
        let values: Vec<&str> = (0..12).map(|_| "3").collect();
        writeln!(image_text, "{}", values.join(" ")).unwrap();
        let keep: Vec<&str> = (0..12)
            .map(|col| if col == 0 && row == 0 { "0" } else { "1" })
            .collect();
        writeln!(mask_text, "{}", keep.join(",")).unwrap();
    }
    std::fs::write(dir.path().join("image.txt"), image_text).unwrap();
    std::fs::write(dir.path().join("mask.txt"), mask_text).unwrap();

    let md = load_metadata(dir.path().join("detector.json")).unwrap();
    let image = read_text_image(dir.path().join("image.txt")).unwrap();
    let mask = read_text_mask(dir.path().join("mask.txt")).unwrap();
    assert_eq!(image.dim(), md.detector.image_shape());

    let input = ImageInput::new(image.view()).with_mask(mask.view());
    let config = IntegrationConfig::new().with_bins(6).with_x_axis(XAxis::Pixel);
    let profile = integrate(&input, Some(&md), &config)
        .unwrap()
        .into_profile()
        .unwrap();
    assert_abs_diff_eq!(profile.histogram.sum(), 95.0);

    let out = dir.path().join("profile.csv");
    DataFileWriter::create(&out)
        .unwrap()
        .write_profile_csv(&profile)
        .unwrap();
    let content = std::fs::read_to_string(&out).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("pixel,intensity"));
    for line in lines {
        let (_, value) = line.split_once(',').unwrap();
        assert_abs_diff_eq!(value.parse::<f64>().unwrap(), 3.0, epsilon = 1e-12);
    }
}
