//! Inspection and round trip checks for Srx archives

use {
    anstyle::AnsiColor,
    clap::Parser,
    gigsrx::{
        Archive, ArchiveResult, LoopType, Object, SampleLoop, Serializable, TimeBase, Uid,
        impl_archivable,
    },
    std::{collections::HashSet, error::Error, path::PathBuf},
    tracing_subscriber::EnvFilter,
};

#[derive(clap::Parser)]
enum Args {
    /// Print the object tree of an archive
    Dump {
        path: PathBuf,
        /// Show raw (not demangled) type names
        #[arg(long)]
        raw_names: bool,
    },
    /// Check that an archive decodes to the same objects after encoding it again
    Roundtrip { paths: Vec<PathBuf> },
    /// Write a small archive to play with
    Demo { out_path: PathBuf },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    match Args::parse() {
        Args::Dump { path, raw_names } => dump(&std::fs::read(path)?, !raw_names)?,
        Args::Roundtrip { paths } => {
            let mut failed = false;
            for path in paths {
                let name = path.display().to_string();
                match roundtrip(&std::fs::read(&path)?) {
                    Ok(()) => pass(&name),
                    Err(e) => {
                        fail(&format!("{name}: {e}"));
                        failed = true;
                    }
                }
            }
            if failed {
                return Err("Round trip failed".into());
            }
        }
        Args::Demo { out_path } => std::fs::write(out_path, demo_archive()?)?,
    }
    Ok(())
}

fn dump(data: &[u8], demangle: bool) -> Result<(), Box<dyn Error>> {
    let ar = Archive::from_raw_data(data)?;
    println!("Name: {:?}", ar.name());
    println!("Comment: {:?}", ar.comment());
    if let Some(t) = ar.date_time_created(TimeBase::Local) {
        println!("Created: {t}");
    }
    if let Some(t) = ar.date_time_modified(TimeBase::Local) {
        println!("Modified: {t}");
    }
    println!("Objects: {}", ar.objects().count());
    let mut seen = HashSet::new();
    if let Some(root) = ar.root_object() {
        dump_object(&ar, root, "<root>", 0, demangle, &mut seen);
    }
    Ok(())
}

fn type_name(obj: &Object, demangle: bool) -> String {
    let ty = obj.data_type();
    if demangle {
        ty.as_long_descr()
    } else {
        format!("{} {}", ty.base_type_name(), ty.custom_type_name(false))
    }
}

fn dump_object(
    ar: &Archive,
    obj: &Object,
    name: &str,
    depth: usize,
    demangle: bool,
    seen: &mut HashSet<Uid>,
) {
    let indent = "  ".repeat(depth);
    let uid = obj.uid(0);
    let ty = type_name(obj, demangle);
    let version = if obj.version() == 0 {
        String::new()
    } else {
        format!(" v{} (min {})", obj.version(), obj.min_version())
    };
    if !seen.insert(uid) {
        println!("{indent}{name}: {ty} @ {uid} (seen above)");
        return;
    }
    if obj.data_type().is_pointer() {
        let pointee = obj.uid(1);
        match ar.object_by_uid(pointee) {
            Some(target) => {
                println!("{indent}{name}: {ty} -> {pointee}");
                dump_object(ar, target, "*", depth + 1, demangle, seen);
            }
            None => println!("{indent}{name}: {ty} -> null"),
        }
        return;
    }
    match ar.value_as_string(uid) {
        Ok(value) if obj.data_type().is_primitive() => {
            println!("{indent}{name}: {ty} = {value:?}{version}");
        }
        _ => {
            println!("{indent}{name}: {ty}{version}");
            for member in obj.members() {
                match ar.object_by_uid(member.uid()) {
                    Some(child) => {
                        dump_object(ar, child, member.name(), depth + 1, demangle, seen);
                    }
                    None => println!("{indent}  {}: <missing {}>", member.name(), member.uid()),
                }
            }
        }
    }
}

fn roundtrip(data: &[u8]) -> Result<(), Box<dyn Error>> {
    let mut first = Archive::from_raw_data(data)?;
    let again = first.reencode().to_vec();
    let second = Archive::from_raw_data(&again)?;
    if !first.objects().eq(second.objects()) {
        return Err("Objects differ".into());
    }
    if first.root_uid() != second.root_uid() {
        return Err("Root differs".into());
    }
    if (first.name(), first.comment()) != (second.name(), second.comment()) {
        return Err("Name or comment differs".into());
    }
    if first.time_stamp_created() != second.time_stamp_created() {
        return Err("Creation time differs".into());
    }
    Ok(())
}

#[derive(Default)]
struct Demo {
    title: String,
    gain: f64,
    muted: bool,
    loops: Vec<SampleLoop>,
}

impl Serializable for Demo {
    fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
        ar.member("title", &mut self.title)?;
        ar.member("gain", &mut self.gain)?;
        ar.member("muted", &mut self.muted)?;
        ar.member("loops", &mut self.loops)
    }
}

impl_archivable!(Demo);

fn demo_archive() -> ArchiveResult<Vec<u8>> {
    let mut demo = Demo {
        title: "Demo".into(),
        gain: 0.5,
        muted: false,
        loops: vec![
            SampleLoop {
                loop_type: LoopType::Normal,
                start: 100,
                length: 400,
                play_count: 0,
            },
            SampleLoop {
                loop_type: LoopType::Bidirectional,
                start: 32,
                length: 64,
                play_count: 3,
            },
        ],
    };
    let mut ar = Archive::new();
    ar.set_name("srxtool demo");
    ar.serialize(&mut demo)?;
    Ok(ar.raw_data().to_vec())
}

fn pass(msg: &str) {
    let style = anstyle::Style::new()
        .fg_color(Some(anstyle::Color::Ansi(AnsiColor::Green)))
        .bold();
    eprintln!("{style}[PASS]{style:#} {msg}");
}

fn fail(msg: &str) {
    let style = anstyle::Style::new()
        .fg_color(Some(anstyle::Color::Ansi(AnsiColor::Red)))
        .bold();
    eprintln!("{style}[FAIL]{style:#} {msg}");
}
