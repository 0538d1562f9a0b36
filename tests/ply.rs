//! End to end tests: write and read whole files in all three encodings and
//! check the exact callback sequences.

use std::cell::RefCell;
use std::io::{self, Read};
use std::rc::Rc;

use plyio::{Action, Encoding, Error, PropertyType, Reader, ScalarType, Writer};

/// One callback invocation, flattened for comparison.
#[derive(Debug, Clone, PartialEq)]
struct Event {
    element: String,
    instance: u64,
    property: String,
    length: u64,
    value_index: i64,
    value: f64,
}

fn ev(
    element: &str,
    instance: u64,
    property: &str,
    length: u64,
    value_index: i64,
    value: f64,
) -> Event {
    Event {
        element: element.into(),
        instance,
        property: property.into(),
        length,
        value_index,
        value,
    }
}

/// Registers a collecting callback for every declared (element, property)
/// pair.
fn collect_events<R: Read>(reader: &mut Reader<'_, R>) -> Rc<RefCell<Vec<Event>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let pairs: Vec<(String, String)> = reader
        .elements()
        .iter()
        .flat_map(|e| {
            e.property_defs
                .iter()
                .map(move |p| (e.name.clone(), p.name.clone()))
        })
        .collect();
    for (elem, prop) in pairs {
        let events = Rc::clone(&events);
        reader.set_read_cb(&elem, &prop, move |arg| {
            events.borrow_mut().push(Event {
                element: arg.element().name.clone(),
                instance: arg.instance(),
                property: arg.property().name.clone(),
                length: arg.length(),
                value_index: arg.value_index(),
                value: arg.value(),
            });
            Action::Continue
        });
    }
    events
}

const TRIANGLE_VALUES: [f64; 13] = [
    -1.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, //
    1.0, 0.0, 0.0, //
    3.0, 0.0, 1.0, 2.0, // the face: length prefix, then three indices
];

/// The sample triangle (3 vertices, one 3-vertex face), produced by this
/// crate's writer in the given encoding.
fn triangle(encoding: Encoding) -> Vec<u8> {
    let mut writer = Writer::create(Vec::new(), encoding);
    writer.add_comment("created by plyio tests").unwrap();
    writer.add_element("vertex", 3).unwrap();
    writer.add_scalar_property("x", ScalarType::Float).unwrap();
    writer.add_scalar_property("y", ScalarType::Float).unwrap();
    writer.add_scalar_property("z", ScalarType::Float).unwrap();
    writer.add_element("face", 1).unwrap();
    writer
        .add_list_property("vertex_indices", ScalarType::UChar, ScalarType::Int)
        .unwrap();
    writer.write_header().unwrap();
    for v in TRIANGLE_VALUES {
        writer.write(v).unwrap();
    }
    writer.finish().unwrap()
}

fn triangle_events() -> Vec<Event> {
    vec![
        ev("vertex", 0, "x", 1, 0, -1.0),
        ev("vertex", 0, "y", 1, 0, 0.0),
        ev("vertex", 0, "z", 1, 0, 0.0),
        ev("vertex", 1, "x", 1, 0, 0.0),
        ev("vertex", 1, "y", 1, 0, 1.0),
        ev("vertex", 1, "z", 1, 0, 0.0),
        ev("vertex", 2, "x", 1, 0, 1.0),
        ev("vertex", 2, "y", 1, 0, 0.0),
        ev("vertex", 2, "z", 1, 0, 0.0),
        ev("face", 0, "vertex_indices", 3, -1, 3.0),
        ev("face", 0, "vertex_indices", 3, 0, 0.0),
        ev("face", 0, "vertex_indices", 3, 1, 1.0),
        ev("face", 0, "vertex_indices", 3, 2, 2.0),
    ]
}

fn read_all(bytes: &[u8]) -> Vec<Event> {
    let mut reader = Reader::new(bytes).unwrap();
    let events = collect_events(&mut reader);
    reader.read().unwrap();
    // The registered callbacks keep their own handles on the event list, so
    // the contents are cloned out instead of unwrapping the Rc.
    let out = events.borrow().clone();
    out
}

/// Reads `src` and writes the same schema and values in `target` encoding.
fn transcode(src: &[u8], target: Encoding) -> Vec<u8> {
    let mut reader = Reader::new(src).unwrap();

    let mut writer = Writer::create(Vec::new(), target);
    for c in reader.comments() {
        writer.add_comment(c).unwrap();
    }
    for o in reader.obj_infos() {
        writer.add_obj_info(o).unwrap();
    }
    for elem in reader.elements() {
        writer.add_element(&elem.name, elem.count).unwrap();
        for prop in &elem.property_defs {
            match prop.ty {
                PropertyType::Scalar(ty) => {
                    writer.add_scalar_property(&prop.name, ty).unwrap();
                }
                PropertyType::List { len_type, scalar_type } => {
                    writer
                        .add_list_property(&prop.name, len_type, scalar_type)
                        .unwrap();
                }
            }
        }
    }
    writer.write_header().unwrap();

    let events = collect_events(&mut reader);
    reader.read().unwrap();
    // The callback sequence is exactly the declaration-order value stream
    // the writer expects, list lengths included.
    for event in events.borrow().iter() {
        writer.write(event.value).unwrap();
    }
    writer.finish().unwrap()
}

// ===========================================================================

#[test]
fn minimal_triangle_ascii() {
    let file = triangle(Encoding::Ascii);
    let text = std::str::from_utf8(&file).unwrap();
    assert!(text.starts_with("ply\nformat ascii 1.0\n"));
    assert!(text.contains("property list uchar int vertex_indices\n"));
    assert!(text.ends_with("end_header\n-1 0 0\n0 1 0\n1 0 0\n3 0 1 2\n"));

    assert_eq!(read_all(&file), triangle_events());
}

#[test]
fn callback_sequence_is_identical_across_encodings() {
    let expected = triangle_events();
    for encoding in [
        Encoding::Ascii,
        Encoding::BinaryLittleEndian,
        Encoding::BinaryBigEndian,
    ] {
        assert_eq!(read_all(&triangle(encoding)), expected, "{:?}", encoding);
    }
}

#[test]
fn endian_swap_changes_bytes_but_not_values() {
    let le = triangle(Encoding::BinaryLittleEndian);
    let be = triangle(Encoding::BinaryBigEndian);
    assert_ne!(le, be);
    assert_eq!(read_all(&le), read_all(&be));
}

#[test]
fn transcoding_is_idempotent_after_one_round() {
    // binary -> ascii -> binary is byte-identical.
    let b1 = triangle(Encoding::BinaryBigEndian);
    let ascii = transcode(&b1, Encoding::Ascii);
    let b2 = transcode(&ascii, Encoding::BinaryBigEndian);
    assert_eq!(b1, b2);

    // ascii -> binary -> ascii is value-identical.
    let a1 = triangle(Encoding::Ascii);
    let binary = transcode(&a1, Encoding::BinaryLittleEndian);
    let a2 = transcode(&binary, Encoding::Ascii);
    assert_eq!(read_all(&a1), read_all(&a2));
}

#[test]
fn round_trip_preserves_values() {
    // Values chosen to be exactly representable in the property types.
    let values = [0.5, -1.25, 65504.0, 2.0, -7.0, 1.0, 0.0];

    for encoding in [
        Encoding::Ascii,
        Encoding::BinaryLittleEndian,
        Encoding::BinaryBigEndian,
    ] {
        let mut writer = Writer::create(Vec::new(), encoding);
        writer.add_element("sample", 1).unwrap();
        writer.add_scalar_property("a", ScalarType::Float).unwrap();
        writer.add_scalar_property("b", ScalarType::Double).unwrap();
        writer.add_scalar_property("c", ScalarType::Double).unwrap();
        writer
            .add_list_property("d", ScalarType::UShort, ScalarType::Short)
            .unwrap();
        writer.add_scalar_property("e", ScalarType::UChar).unwrap();
        writer.write_header().unwrap();
        for v in values {
            writer.write(v).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let got: Vec<f64> = read_all(&bytes).iter().map(|e| e.value).collect();
        assert_eq!(&got, &values, "{:?}", encoding);
    }
}

#[test]
fn empty_elements_produce_no_callbacks() {
    let mut writer = Writer::create(Vec::new(), Encoding::Ascii);
    writer.add_element("vertex", 0).unwrap();
    writer.add_scalar_property("x", ScalarType::Float).unwrap();
    writer.add_element("face", 1).unwrap();
    writer
        .add_list_property("vertex_indices", ScalarType::UChar, ScalarType::Int)
        .unwrap();
    writer.write_header().unwrap();
    writer.write(0.0).unwrap(); // the face's empty list
    let bytes = writer.finish().unwrap();

    let mut reader = Reader::new(&bytes[..]).unwrap();
    // The pair exists but the element is declared empty.
    assert_eq!(reader.set_read_cb("vertex", "x", |_| Action::Continue), 0);
    // Unknown pairs return 0 and do not raise.
    assert_eq!(reader.set_read_cb("vertex", "w", |_| Action::Continue), 0);
    assert_eq!(reader.set_read_cb("edge", "x", |_| Action::Continue), 0);

    let events = collect_events(&mut reader);
    reader.read().unwrap();

    assert_eq!(*events.borrow(), [ev("face", 0, "vertex_indices", 0, -1, 0.0)]);
}

#[test]
fn zero_length_list_fires_exactly_the_length_callback() {
    let file = b"ply\n\
        format ascii 1.0\n\
        element face 1\n\
        property list uchar int vertex_indices\n\
        end_header\n\
        0\n";
    assert_eq!(read_all(file), [ev("face", 0, "vertex_indices", 0, -1, 0.0)]);
}

#[test]
fn written_values_are_clamped_to_their_type() {
    let mut writer = Writer::create(Vec::new(), Encoding::BinaryLittleEndian);
    writer.add_element("sample", 1).unwrap();
    writer.add_scalar_property("a", ScalarType::UChar).unwrap();
    writer.add_scalar_property("b", ScalarType::Short).unwrap();
    writer.add_scalar_property("c", ScalarType::Float).unwrap();
    writer.write_header().unwrap();
    writer.write(300.0).unwrap();
    writer.write(-1.5).unwrap();
    writer.write(1e40).unwrap();
    let bytes = writer.finish().unwrap();

    let body_start = find(&bytes, b"end_header\n") + b"end_header\n".len();
    let body = &bytes[body_start..];
    assert_eq!(body[0], 255);
    assert_eq!(&body[1..3], (-1i16).to_le_bytes());
    assert_eq!(&body[3..7], f32::INFINITY.to_le_bytes());

    let got: Vec<f64> = read_all(&bytes).iter().map(|e| e.value).collect();
    assert_eq!(got, [255.0, -1.0, f64::INFINITY]);
}

fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap()
}

#[test]
fn aborting_halts_the_read_and_poisons_the_handle() {
    let file = triangle(Encoding::Ascii);
    let mut reader = Reader::new(&file[..]).unwrap();

    let calls = Rc::new(RefCell::new(0u32));
    for prop in ["x", "y", "z"] {
        let calls = Rc::clone(&calls);
        reader.set_read_cb("vertex", prop, move |arg| {
            *calls.borrow_mut() += 1;
            if arg.instance() == 1 {
                Action::Abort
            } else {
                Action::Continue
            }
        });
    }

    assert!(matches!(reader.read(), Err(Error::Aborted)));
    // Three values of the first vertex, then the aborting call.
    assert_eq!(*calls.borrow(), 4);

    assert!(matches!(reader.read(), Err(Error::InvalidState(_))));
    // No callback fired for the second attempt.
    assert_eq!(*calls.borrow(), 4);
}

#[test]
fn the_error_hook_sees_failures() {
    let file = triangle(Encoding::Ascii);
    let mut reader = Reader::new(&file[..]).unwrap();

    let reported = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&reported);
    reader.set_error_hook(move |e| sink.borrow_mut().push(e.to_string()));
    reader.set_read_cb("vertex", "x", |_| Action::Abort);

    assert!(reader.read().is_err());
    assert_eq!(*reported.borrow(), [Error::Aborted.to_string()]);
}

#[test]
fn latest_registration_wins() {
    let file = triangle(Encoding::Ascii);
    let mut reader = Reader::new(&file[..]).unwrap();

    let tags = Rc::new(RefCell::new(Vec::new()));
    let first = Rc::clone(&tags);
    reader.set_read_cb("vertex", "x", move |_| {
        first.borrow_mut().push("first");
        Action::Continue
    });
    let second = Rc::clone(&tags);
    reader.set_read_cb("vertex", "x", move |_| {
        second.borrow_mut().push("second");
        Action::Continue
    });

    reader.read().unwrap();
    assert_eq!(*tags.borrow(), ["second", "second", "second"]);
}

#[test]
fn crlf_files_parse_with_identical_values() {
    let lf = triangle(Encoding::Ascii);
    let crlf: Vec<u8> = String::from_utf8(lf.clone())
        .unwrap()
        .replace('\n', "\r\n")
        .into_bytes();
    assert_eq!(read_all(&crlf), read_all(&lf));
}

#[test]
fn trailing_bytes_after_the_last_instance_are_ignored() {
    let mut file = triangle(Encoding::Ascii);
    file.extend_from_slice(b"leftover garbage");
    assert_eq!(read_all(&file), triangle_events());
}

#[test]
fn ascii_values_may_wrap_lines_arbitrarily() {
    let file = b"ply\n\
        format ascii 1.0\n\
        element vertex 2\n\
        property float x\n\
        property float y\n\
        end_header\n\
        1\n2 3\n\n   4\n";
    let got: Vec<f64> = read_all(file).iter().map(|e| e.value).collect();
    assert_eq!(got, [1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn files_round_trip_through_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triangle.ply");

    let mut writer = Writer::create_file(&path, Encoding::BinaryLittleEndian).unwrap();
    writer.add_element("vertex", 3).unwrap();
    writer.add_scalar_property("x", ScalarType::Float).unwrap();
    writer.add_scalar_property("y", ScalarType::Float).unwrap();
    writer.add_scalar_property("z", ScalarType::Float).unwrap();
    writer.add_element("face", 1).unwrap();
    writer
        .add_list_property("vertex_indices", ScalarType::UChar, ScalarType::Int)
        .unwrap();
    writer.write_header().unwrap();
    for v in TRIANGLE_VALUES {
        writer.write(v).unwrap();
    }
    writer.finish().unwrap();

    let mut reader = Reader::open(&path).unwrap();
    assert_eq!(reader.encoding(), Encoding::BinaryLittleEndian);
    let events = collect_events(&mut reader);
    reader.read().unwrap();
    assert_eq!(*events.borrow(), triangle_events());
}

#[test]
fn memory_sinks_report_the_written_size() {
    let reference = triangle(Encoding::BinaryBigEndian);

    let mut storage = [0u8; 512];
    let mut writer = Writer::create(
        io::Cursor::new(&mut storage[..]),
        Encoding::BinaryBigEndian,
    );
    writer.add_comment("created by plyio tests").unwrap();
    writer.add_element("vertex", 3).unwrap();
    writer.add_scalar_property("x", ScalarType::Float).unwrap();
    writer.add_scalar_property("y", ScalarType::Float).unwrap();
    writer.add_scalar_property("z", ScalarType::Float).unwrap();
    writer.add_element("face", 1).unwrap();
    writer
        .add_list_property("vertex_indices", ScalarType::UChar, ScalarType::Int)
        .unwrap();
    writer.write_header().unwrap();
    for v in TRIANGLE_VALUES {
        writer.write(v).unwrap();
    }
    let cursor = writer.finish().unwrap();

    let size = cursor.position() as usize;
    assert_eq!(size, reference.len());
    assert_eq!(&cursor.into_inner()[..size], &reference[..]);
}

#[test]
fn a_full_sink_reports_an_io_error() {
    let mut storage = [0u8; 16]; // too small for even the header
    let mut writer = Writer::create(io::Cursor::new(&mut storage[..]), Encoding::Ascii);
    writer.add_element("vertex", 1).unwrap();
    writer.add_scalar_property("x", ScalarType::Float).unwrap();
    // Nothing fails yet: the output is buffered until the final flush.
    writer.write_header().unwrap();
    writer.write(1.0).unwrap();
    assert!(matches!(writer.finish(), Err(Error::Io(_))));
}
