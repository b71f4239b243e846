use crate::element::{AttributeValue, Frame, NativeElementImpl, NativeHandle, Point, Size};
use crate::errors::NativeError;
use accessibility::AXUIElement;
use accessibility_sys::{
    kAXValueTypeCGPoint, kAXValueTypeCGRect, kAXValueTypeCGSize, AXUIElementCopyActionNames,
    AXUIElementCopyAttributeValue, AXUIElementGetPid, AXUIElementGetTypeID, AXUIElementPerformAction,
    AXUIElementRef, AXUIElementSetAttributeValue, AXValueCreate, AXValueGetType, AXValueGetTypeID,
    AXValueGetValue, AXValueRef,
};
use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use std::ffi::c_void;
use std::fmt;

/// An `AXUIElementRef` owned under the CoreFoundation create rule.
#[derive(Clone)]
pub struct MacOSElement {
    ax: AXUIElement,
}

// SAFETY: AXUIElementRef is an immutable CF object; the AX client API may be called from any
// thread for the short-lived queries made here.
unsafe impl Send for MacOSElement {}
unsafe impl Sync for MacOSElement {}

impl fmt::Debug for MacOSElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacOSElement")
            .field("address", &self.address())
            .finish()
    }
}

pub(crate) fn check(code: i32) -> Result<(), NativeError> {
    match NativeError::from_code(code) {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

impl MacOSElement {
    pub fn new(ax: AXUIElement) -> Self {
        Self { ax }
    }

    pub fn handle(ax: AXUIElement) -> NativeHandle {
        NativeHandle::new(Self::new(ax))
    }

    pub fn ax(&self) -> &AXUIElement {
        &self.ax
    }

    fn copy_attribute(&self, name: &str) -> Result<Option<CFType>, NativeError> {
        let key = CFString::new(name);
        let mut value: CFTypeRef = std::ptr::null();
        let code = unsafe {
            AXUIElementCopyAttributeValue(
                self.ax.as_concrete_TypeRef(),
                key.as_concrete_TypeRef(),
                &mut value,
            )
        };
        match check(code) {
            Ok(()) if value.is_null() => Ok(None),
            Ok(()) => Ok(Some(unsafe { CFType::wrap_under_create_rule(value) })),
            Err(e) if e.is_missing_value() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn element_from(value: &CFType) -> Option<AXUIElement> {
    if value.type_of() != unsafe { AXUIElementGetTypeID() } {
        return None;
    }
    Some(unsafe { AXUIElement::wrap_under_get_rule(value.as_CFTypeRef() as AXUIElementRef) })
}

fn decode_ax_value(value: &CFType) -> Option<AttributeValue> {
    if value.type_of() != unsafe { AXValueGetTypeID() } {
        return None;
    }
    let raw = value.as_CFTypeRef() as AXValueRef;
    unsafe {
        match AXValueGetType(raw) {
            t if t == kAXValueTypeCGPoint => {
                let mut p = CGPoint::new(0.0, 0.0);
                AXValueGetValue(raw, t, (&mut p as *mut CGPoint).cast())
                    .then(|| AttributeValue::Point(Point::new(p.x, p.y)))
            }
            t if t == kAXValueTypeCGSize => {
                let mut s = CGSize::new(0.0, 0.0);
                AXValueGetValue(raw, t, (&mut s as *mut CGSize).cast()).then(|| {
                    AttributeValue::Size(Size {
                        width: s.width,
                        height: s.height,
                    })
                })
            }
            t if t == kAXValueTypeCGRect => {
                let mut r = CGRect::new(&CGPoint::new(0.0, 0.0), &CGSize::new(0.0, 0.0));
                AXValueGetValue(raw, t, (&mut r as *mut CGRect).cast()).then(|| {
                    AttributeValue::Frame(Frame::new(
                        r.origin.x,
                        r.origin.y,
                        r.size.width,
                        r.size.height,
                    ))
                })
            }
            _ => None,
        }
    }
}

fn decode(value: &CFType) -> Option<AttributeValue> {
    if let Some(s) = value.downcast::<CFString>() {
        return Some(AttributeValue::String(s.to_string()));
    }
    if let Some(b) = value.downcast::<CFBoolean>() {
        return Some(AttributeValue::Bool(bool::from(b)));
    }
    if let Some(n) = value.downcast::<CFNumber>() {
        return n.to_f64().map(AttributeValue::Number);
    }
    decode_ax_value(value)
}

fn encode(value: &AttributeValue) -> Option<CFType> {
    let wrap_ax = |ty, ptr: *const c_void| -> Option<CFType> {
        let raw = unsafe { AXValueCreate(ty, ptr) };
        (!raw.is_null()).then(|| unsafe { CFType::wrap_under_create_rule(raw as CFTypeRef) })
    };
    match value {
        AttributeValue::String(s) => Some(CFString::new(s).as_CFType()),
        AttributeValue::Bool(b) => Some(CFBoolean::from(*b).as_CFType()),
        AttributeValue::Number(n) => Some(CFNumber::from(*n).as_CFType()),
        AttributeValue::Point(p) => {
            let point = CGPoint::new(p.x, p.y);
            wrap_ax(
                kAXValueTypeCGPoint,
                (&point as *const CGPoint).cast::<c_void>(),
            )
        }
        AttributeValue::Size(s) => {
            let size = CGSize::new(s.width, s.height);
            wrap_ax(kAXValueTypeCGSize, (&size as *const CGSize).cast::<c_void>())
        }
        AttributeValue::Frame(f) => {
            let rect = CGRect::new(&CGPoint::new(f.x, f.y), &CGSize::new(f.width, f.height));
            wrap_ax(kAXValueTypeCGRect, (&rect as *const CGRect).cast::<c_void>())
        }
    }
}

impl NativeElementImpl for MacOSElement {
    fn address(&self) -> usize {
        self.ax.as_CFTypeRef() as usize
    }

    fn attribute(&self, name: &str) -> Result<Option<AttributeValue>, NativeError> {
        Ok(self.copy_attribute(name)?.as_ref().and_then(decode))
    }

    fn element_attribute(&self, name: &str) -> Result<Option<NativeHandle>, NativeError> {
        Ok(self
            .copy_attribute(name)?
            .as_ref()
            .and_then(element_from)
            .map(MacOSElement::handle))
    }

    fn children(&self) -> Result<Vec<NativeHandle>, NativeError> {
        let Some(value) = self.copy_attribute("AXChildren")? else {
            return Ok(Vec::new());
        };
        if value.type_of() != CFArray::<CFType>::type_id() {
            return Ok(Vec::new());
        }
        let array: CFArray<CFType> =
            unsafe { CFArray::wrap_under_get_rule(value.as_CFTypeRef() as CFArrayRef) };
        Ok(array
            .iter()
            .filter_map(|item| element_from(&item))
            .map(MacOSElement::handle)
            .collect())
    }

    fn parent(&self) -> Result<Option<NativeHandle>, NativeError> {
        self.element_attribute("AXParent")
    }

    fn action_names(&self) -> Result<Vec<String>, NativeError> {
        let mut names: CFArrayRef = std::ptr::null();
        check(unsafe { AXUIElementCopyActionNames(self.ax.as_concrete_TypeRef(), &mut names) })?;
        if names.is_null() {
            return Ok(Vec::new());
        }
        let array: CFArray<CFString> = unsafe { CFArray::wrap_under_create_rule(names) };
        Ok(array.iter().map(|name| name.to_string()).collect())
    }

    fn perform_action(&self, action: &str) -> Result<(), NativeError> {
        let name = CFString::new(action);
        check(unsafe {
            AXUIElementPerformAction(self.ax.as_concrete_TypeRef(), name.as_concrete_TypeRef())
        })
    }

    fn set_attribute(&self, name: &str, value: AttributeValue) -> Result<(), NativeError> {
        let encoded = encode(&value).ok_or(NativeError::IllegalArgument)?;
        let key = CFString::new(name);
        check(unsafe {
            AXUIElementSetAttributeValue(
                self.ax.as_concrete_TypeRef(),
                key.as_concrete_TypeRef(),
                encoded.as_CFTypeRef(),
            )
        })
    }

    fn process_id(&self) -> Result<i32, NativeError> {
        let mut pid = 0;
        check(unsafe { AXUIElementGetPid(self.ax.as_concrete_TypeRef(), &mut pid) })?;
        Ok(pid)
    }

    fn same_element(&self, other: &dyn NativeElementImpl) -> bool {
        other
            .as_any()
            .downcast_ref::<MacOSElement>()
            .is_some_and(|o| o.ax == self.ax)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
