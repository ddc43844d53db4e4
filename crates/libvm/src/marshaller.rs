//! Domain descriptions handed to libvirt.
use std::{
    fmt::Write,
    fs,
    path::{Path, PathBuf},
};

use libcompute::{Architecture, Compute, ComputeError, Result};
use log::debug;
use quick_xml::escape::escape;

pub type DMarshaller = Box<dyn Marshaller + Send + Sync>;

/// Produces and persists the domain description of a compute.
pub trait Marshaller {
    /// Render the description for `compute` booting from `disk` and persist it.
    fn create_description(&self, compute: &Compute, disk: &Path) -> Result<PathBuf>;

    /// Persisted description of compute `id`.
    fn description(&self, id: &str) -> Result<String>;
}

/// Writes KVM domain XML to `<xml_directory>/<id>.xml`.
pub struct XmlMarshaller {
    xml_directory: PathBuf,
}

impl XmlMarshaller {
    pub fn new<P: Into<PathBuf>>(xml_directory: P) -> Self {
        XmlMarshaller {
            xml_directory: xml_directory.into(),
        }
    }

    #[inline]
    fn xml_file(&self, id: &str) -> PathBuf {
        self.xml_directory.join(format!("{id}.xml"))
    }
}

#[inline]
fn arch(architecture: Architecture) -> &'static str {
    match architecture {
        Architecture::X86 => "i686",
        Architecture::X64 => "x86_64",
    }
}

pub fn compute_to_xml(compute: &Compute, disk: &Path) -> anyhow::Result<String> {
    let mut buf = String::from("<domain type='kvm'>\n");

    // Init identity
    let id = escape(compute.id.as_str());
    writeln!(&mut buf, "<name>{}</name>", id)?;
    writeln!(&mut buf, "<uuid>{}</uuid>", id)?;
    if !compute.hostname.is_empty() {
        writeln!(&mut buf, "<title>{}</title>", escape(compute.hostname.as_str()))?;
    }

    // Init memory
    let memory = (compute.memory * 1024.0).round() as u64;
    writeln!(&mut buf, "<memory unit='MiB'>{}</memory>", memory)?;
    writeln!(&mut buf, "<currentMemory unit='MiB'>{}</currentMemory>", memory)?;

    // Init CPU
    writeln!(&mut buf, "<vcpu placement='static'>{}</vcpu>", compute.cores)?;

    // Init OS
    writeln!(
        &mut buf,
        "<os>\n<type arch='{}' machine='pc'>hvm</type>\n<boot dev='hd'/>\n</os>",
        arch(compute.architecture)
    )?;

    // Init Rootfs
    let rootfs = format!(
        "\
        <disk type='file' device='disk'>\n\
        <driver name='qemu' type='{}'/>\n\
        <source file='{}'/>\n\
        <target dev='vda' bus='virtio'/>\n\
        </disk>",
        escape(compute.disk_format.as_str()),
        escape(&*disk.to_string_lossy())
    );

    write!(
        &mut buf,
        "<features>
<acpi/>
<apic/>
<pae/>
</features>
<clock offset='utc'/>
<on_poweroff>destroy</on_poweroff>
<on_reboot>restart</on_reboot>
<on_crash>destroy</on_crash>
<devices>
{}
<interface type='network'>
<source network='default'/>
<model type='virtio'/>
</interface>
<serial type='pty'>
<target port='0'/>
</serial>
<console type='pty'>
<target type='serial' port='0'/>
</console>
<input type='mouse' bus='ps2'/>
<memballoon model='virtio'/>
</devices>
</domain>",
        rootfs
    )?;
    Ok(buf)
}

impl Marshaller for XmlMarshaller {
    fn create_description(&self, compute: &Compute, disk: &Path) -> Result<PathBuf> {
        let marshal_err = |source: anyhow::Error| ComputeError::Marshal {
            id: compute.id.clone(),
            source,
        };

        let xml = compute_to_xml(compute, disk).map_err(marshal_err)?;
        fs::create_dir_all(&self.xml_directory).map_err(|source| ComputeError::Filesystem {
            path: self.xml_directory.clone(),
            source,
        })?;

        let file = self.xml_file(&compute.id);
        fs::write(&file, xml).map_err(|source| ComputeError::Filesystem {
            path: file.clone(),
            source,
        })?;
        debug!("domain description of {} written to {:?}", compute.id, file);
        Ok(file)
    }

    fn description(&self, id: &str) -> Result<String> {
        let file = self.xml_file(id);
        if !file.exists() {
            return Err(ComputeError::DescriptionNotFound(file));
        }
        fs::read_to_string(&file).map_err(|source| ComputeError::Filesystem { path: file, source })
    }
}
