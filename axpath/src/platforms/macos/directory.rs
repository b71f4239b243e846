use crate::platforms::{ApplicationDirectory, ProcessHandle};
use objc::runtime::{Class, Object};
use objc::{msg_send, sel, sel_impl};
use objc_foundation::{INSString, NSString};
use tracing::debug;

/// `NSWorkspace.sharedWorkspace.runningApplications`.
pub struct RunningApplications;

unsafe fn ns_string(value: *mut NSString) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some((*value).as_str().to_string())
    }
}

impl RunningApplications {
    pub fn list(&self) -> Vec<ProcessHandle> {
        let Some(workspace_class) = Class::get("NSWorkspace") else {
            debug!("NSWorkspace class unavailable");
            return Vec::new();
        };
        let mut processes = Vec::new();
        unsafe {
            let workspace: *mut Object = msg_send![workspace_class, sharedWorkspace];
            if workspace.is_null() {
                return processes;
            }
            let apps: *mut Object = msg_send![workspace, runningApplications];
            if apps.is_null() {
                return processes;
            }
            let count: usize = msg_send![apps, count];
            for i in 0..count {
                let app: *mut Object = msg_send![apps, objectAtIndex: i];
                if app.is_null() {
                    continue;
                }
                let pid: i32 = msg_send![app, processIdentifier];
                let bundle: *mut NSString = msg_send![app, bundleIdentifier];
                let name: *mut NSString = msg_send![app, localizedName];
                processes.push(ProcessHandle {
                    pid,
                    bundle_id: ns_string(bundle),
                    name: ns_string(name),
                });
            }
        }
        processes
    }
}

impl ApplicationDirectory for RunningApplications {
    fn find_running_application(&self, id: &str) -> Option<ProcessHandle> {
        let processes = self.list();
        // Exact bundle ids win over a name that happens to match.
        processes
            .iter()
            .find(|p| p.bundle_id.as_deref() == Some(id))
            .or_else(|| processes.iter().find(|p| p.matches(id)))
            .cloned()
    }
}
